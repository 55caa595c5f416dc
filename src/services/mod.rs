pub mod addresses;
pub mod carts;
pub mod order_status;
pub mod orders;
pub mod staged_orders;

pub use addresses::AddressService;
pub use carts::CartService;
pub use orders::OrderService;
pub use staged_orders::StagedOrderService;
