//! Microservice configuration
//!
//! Registration validates a request against the catalog, synthesizes a
//! policy document and commits a [`ConfiguredMicroservice`] to the
//! [`ConfigStore`]. The read side rebuilds listings from the same store.

pub mod attributes;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod store;
pub mod types;

pub use attributes::{
    RawAttributes, ValidatedAttributes, check_declared, scope_to, validate,
};
pub use output::{
    ConfigListing, ConfiguredMicroserviceSummary, MicroserviceConfig, MicroserviceListing,
    OutputAggregator, PolicyListing,
};
pub use pipeline::{Registration, RegistrationPipeline, RegistrationRequest, Target};
pub use policy::{PolicyDocument, PolicyHeader, PolicyProperty, RequiredCapability, synthesize};
pub use store::ConfigStore;
pub use types::{
    AttributeSet, AttributeSpec, AttributeType, AttributeValue, ConfiguredMicroservice,
    MicroserviceDefinition, MicroserviceId, PatternDefinition, PatternId, PolicyRole,
};
