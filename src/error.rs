use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not open the library database")]
    Database,
    #[display("could not open the library root")]
    Library,
    #[display("sync failed")]
    Sync,
    #[display("backup operation failed")]
    Backup,
    #[display("enrichment worker error")]
    Enrichment,
}
