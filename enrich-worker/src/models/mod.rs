//! Feature registry records as seen by the worker

mod feature;

pub use feature::{Feature, FeatureKind, FeaturePatch, RelatedPoint};
