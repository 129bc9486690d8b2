pub mod catalog;
pub mod cleanup;
pub mod payment;
pub mod pricing;
pub mod reservation;
pub mod scheduler;

pub use catalog::CatalogService;
pub use cleanup::CleanupService;
pub use payment::PaymentVerifier;
pub use pricing::PricingEngine;
pub use reservation::{ReservationService, ShowtimeLocks};
