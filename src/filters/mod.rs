pub mod interpolate;
pub mod one_euro;
pub mod presence;

pub use interpolate::{interpolate, RenderInterpolator};
pub use one_euro::{Axis, FilterBank, FilterKey, OneEuroFilter};
pub use presence::{PresenceVoter, PRESENCE_WINDOW};
