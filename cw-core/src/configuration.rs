use cw_domain::RegionId;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct WatcherConfiguration {
    pub esi_base_url: String,
    pub region_id: RegionId,
    pub data_dir: PathBuf,
    pub character_id: Option<i64>,
}
