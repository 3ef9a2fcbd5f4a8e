pub mod identity;
pub mod reference;
