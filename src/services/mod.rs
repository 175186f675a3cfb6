//! Services layer.
//!
//! Business logic for identity lifecycle, verification challenges, login
//! policy, sessions and token issuance, plus the clients for the external
//! collaborators (tenant registry, notifications, audit events).

pub mod challenge;
mod database;
pub mod directory;
pub mod error;
pub mod events;
pub mod identity;
mod jwt;
pub mod notify;
pub mod policy;
pub mod session;

pub use challenge::ChallengeService;
pub use database::{is_unique_violation, Database};
pub use directory::{HttpTenantDirectory, MockTenantDirectory, TenantDirectory};
pub use error::ServiceError;
pub use events::{EventPublisher, HttpEventPublisher, IdentityEvent, MockEventPublisher};
pub use identity::IdentityService;
pub use jwt::{generate_refresh_value, AccessTokenClaims, JwtService, TokenResponse};
pub use notify::{CodeDelivery, DeliveryChannel, HttpNotificationClient, MockCodeDelivery};
pub use policy::LoginDecision;
pub use session::{SessionOrigin, SessionService};
