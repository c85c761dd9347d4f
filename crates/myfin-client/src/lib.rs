//! myfin-client
//!
//! Session driver for the rewards core. External inputs become `Event`s on
//! a tokio channel; a single `Dispatcher` applies them one at a time and
//! talks to the outside world only through the collaborator traits.

pub mod collaborators;
pub mod dispatcher;
pub mod events;

pub use collaborators::{
    Collaborators, ConsoleNavigator, ConsoleNotifier, MemoryNavigator, MemoryNotifier, Navigator,
    Notice, NoticeLevel, Notifier, PaymentGateway, PaymentRequest, SimulatedGateway, View,
};
pub use dispatcher::{Dispatcher, PendingPurchase};
pub use events::{Envelope, Event, EventSender};
