#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsBackend {
    Rustls,
    NativeTls,
}

impl TlsBackend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rustls => "rustls",
            Self::NativeTls => "native-tls",
        }
    }

    pub const fn is_available(self) -> bool {
        match self {
            Self::Rustls => cfg!(feature = "rustls"),
            Self::NativeTls => cfg!(feature = "native-tls"),
        }
    }
}

impl Default for TlsBackend {
    fn default() -> Self {
        if cfg!(feature = "rustls") {
            Self::Rustls
        } else {
            Self::NativeTls
        }
    }
}
