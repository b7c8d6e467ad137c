pub mod helpers;
mod money;
mod secret;

pub use money::{Money, MoneyConversionError, KES_CURRENCY_CODE};
pub use secret::Secret;
