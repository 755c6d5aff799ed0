pub(crate) mod assets_classifier;
pub(crate) mod assets_errors;
pub(crate) mod assets_model;
pub(crate) mod assets_resolver;

pub use assets_classifier::AssetClassifier;
pub use assets_errors::AssetError;
pub use assets_model::{
    Asset, AssetCategory, AssetId, DerivativeSpec, DescriptionSource, FundType, PutCall,
};
pub use assets_resolver::{AssetLookup, AssetResolver};
