//! Core data models for the location hierarchy.

pub mod area;
pub mod city;
pub mod job;
pub mod pincode;
pub mod point;

pub use area::{Area, AreaMetadata, AreaType, SubArea, SubAreaDetails, SubAreaType};
pub use city::{City, CityImportStatus, CityMetadata, PincodeRange};
pub use job::{ImportCounts, ImportJob, JobConfig, JobProgress, JobStatus, PincodeFailure};
pub use pincode::{is_valid_pincode, parse_pincode, Pincode, PincodeMetadata};
pub use point::{GeoPoint, LatLng};
