pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod normalize;
pub mod session;
pub mod validation;

pub use chrono;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::lead::{LeadId, LeadRecord};
pub use domain::quote_request::{
    ConversationId, FieldValue, Gender, MandatoryField, PremiumMode, Product, QuoteParameters,
    QuoteRequest, NO_TABLE_RATING,
};
pub use errors::{ApplicationError, DomainError};
pub use session::{InMemorySessionStore, SessionStore, SessionStoreError};
pub use validation::{validate, ValidationError};
