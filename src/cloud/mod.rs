//! Read-through snapshots of cloud resources (`InstanceView`/`ASGView` in the
//! design docs) plus the `CloudApi` boundary the control loop drives.

pub mod api;
pub mod asg;
pub mod instance;

pub use api::{CloudApi, FakeCloud, LaunchSpec, SpotPriceObservation};
pub use asg::{Asg, LifecycleHook, LifecycleTransition};
pub use instance::{Instance, InstanceState, Lifecycle};
