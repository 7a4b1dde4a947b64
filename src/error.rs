use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("encoding error: {value:#x} does not fit in {width} bytes")]
    Encoding { value: u128, width: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("ELF error: {0}")]
    Elf(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
