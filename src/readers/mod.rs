pub mod co2_reader;
pub mod flux_reader;
pub mod land_cover_reader;
pub mod site_reader;
pub mod whitelist_reader;

pub use co2_reader::GlobalCo2Table;
pub use flux_reader::FluxReader;
pub use land_cover_reader::LandCoverGrid;
pub use site_reader::{SiteCatalog, SiteReader};
pub use whitelist_reader::Whitelist;
