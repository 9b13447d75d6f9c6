use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("region index {0} is out of range ({1} regions)")]
    IndexOutOfRange(u32, u32),

    #[error("chromosome {0} is not present")]
    UnknownChromosome(String),

    #[error("key {0} resolves to zero regions")]
    EmptyRange(String),

    #[error("cannot parse region key: {0}")]
    InvalidKey(String),
}
