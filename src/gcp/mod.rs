//! Google Cloud plumbing shared by both services / 两个服务共用的GCP基础设施

pub mod metadata;

pub use metadata::{AccessTokenSource, MetadataTokenSource, StaticTokenSource};
