use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Custom(String),

    // -- Wire format
    EndOfPacket { pos: usize, wanted: usize },
    PointerLoop { jumps: usize },
    BadLabel { len: u8 },
    EmptyLabel,
    LabelTooLong { len: usize },
    NotAscii,

    // -- Externals
    #[from]
    Io(std::io::Error),
}

impl Error {
    pub fn custom(val: impl std::fmt::Display) -> Self {
        Self::Custom(val.to_string())
    }
}

impl From<&str> for Error {
    fn from(val: &str) -> Self {
        Self::Custom(val.to_string())
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Custom(msg) => write!(fmt, "{msg}"),
            Error::EndOfPacket { pos, wanted } => {
                write!(fmt, "packet ended at byte {pos} while reading {wanted} more")
            }
            Error::PointerLoop { jumps } => {
                write!(fmt, "name compression exceeded {jumps} jumps")
            }
            Error::BadLabel { len } => {
                write!(fmt, "reserved label prefix in length byte {len:#04x}")
            }
            Error::EmptyLabel => write!(fmt, "empty label in domain name"),
            Error::LabelTooLong { len } => write!(fmt, "label of {len} bytes exceeds 63"),
            Error::NotAscii => write!(fmt, "domain name contains non-ascii characters"),
            Error::Io(err) => write!(fmt, "{err}"),
        }
    }
}

impl std::error::Error for Error {}
