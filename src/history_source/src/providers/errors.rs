use std::path::PathBuf;

use snafu::{Backtrace, Snafu};

/// Errors raised by history providers and instrument registries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// Reading a bar file or scanning a history directory failed.
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// A bar file does not hold whole records or is out of order.
    #[snafu(display("corrupt bar file {}: {message}", path.display()))]
    Corrupt {
        path: PathBuf,
        message: String,
        backtrace: Backtrace,
    },

    /// Only the compressed form of a day's bar file exists.
    #[snafu(display("compressed bar file needs to be unpacked first: {}", path.display()))]
    Compressed { path: PathBuf, backtrace: Backtrace },

    /// The registry does not know an instrument.
    #[snafu(display("unknown instrument: {name}"))]
    UnknownInstrument { name: String, backtrace: Backtrace },

    /// The requested operation is not supported by this provider.
    #[snafu(display("not implemented: {message}"))]
    Unimplemented { message: String, backtrace: Backtrace },
}
