use crate::phonebook::PhonebookError;
use crate::profile::ProfileError;
use crate::simtoolkit::ToolkitError;

#[derive(Debug)]
pub enum Error {
    Profile(ProfileError),
    Phonebook(PhonebookError),
    Toolkit(ToolkitError),
    Io(std::io::Error),

    _Unknown,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Profile(e) => write!(f, "profile error: {}", e),
            Error::Phonebook(e) => write!(f, "phonebook error: {}", e),
            Error::Toolkit(e) => write!(f, "sim toolkit error: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::_Unknown => write!(f, "unknown error"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ProfileError> for Error {
    fn from(e: ProfileError) -> Self {
        Error::Profile(e)
    }
}

impl From<PhonebookError> for Error {
    fn from(e: PhonebookError) -> Self {
        Error::Phonebook(e)
    }
}

impl From<ToolkitError> for Error {
    fn from(e: ToolkitError) -> Self {
        Error::Toolkit(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
