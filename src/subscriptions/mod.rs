pub mod api;
pub mod ledger;
pub mod models;

pub use api::{
    create_subscription, list_customer_subscriptions, routes, subscribe, SubscribeRequest,
    SubscriptionView,
};
pub use ledger::{apply_debit, debit_hours, find_active_subscription, HourDebit};
pub use models::{subscription_terms, Subscription, SubscriptionTerms};
