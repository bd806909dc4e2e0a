pub mod arcgis;

pub use arcgis::{ArcGisGeocoder, ArcGisQueryClient};
