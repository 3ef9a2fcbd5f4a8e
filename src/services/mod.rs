pub mod identity_service;
pub mod identity_service_impl;
pub use identity_service::{
    IdentityError, IdentityInfo, IdentityService, IssuedResetToken, LoginResult,
};
pub use identity_service_impl::SeaOrmIdentityService;
