pub mod api;
pub mod closing;
pub mod lifecycle;
pub mod models;
pub mod notices;

pub use api::{routes, CloseVisitRequest, CloseVisitResponse, OpenVisitRequest, VisitView};
pub use closing::{
    plan_closing, BillingPolicy, ClosingError, ClosingPlan, ClosingResult, SubscriptionOutcome,
    VisitCloser,
};
pub use lifecycle::{ClosedVisit, VisitState, VisitTransitionError};
pub use models::{Visit, VisitFilter, VisitStatusFilter, STILL_ACTIVE};
pub use notices::{notices_for, Notice, NoticeLevel};
