//! Swamp lifecycle management (spec §4.F/G/H/I/K): the Hydra registry,
//! its pattern Settings, the Safeops shutdown gate, the business-key
//! Locker, and the Observer in-flight registry.

mod hydra;
mod locker;
mod observer;
mod safeops;
mod settings_registry;

pub use hydra::Hydra;
pub use locker::{LockId, Locker};
pub use observer::{InFlightOp, Observer, ObserverGuard};
pub use safeops::{ExclusivePermit, Safeops, SharedPermit};
pub use settings_registry::SettingsRegistry;
