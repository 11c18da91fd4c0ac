// Copyright 2020-2024, The Tremor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Display;

/// A shared error for common functions
#[derive(Debug)]
pub enum Error {
    /// Failed to create a directory
    DirCreate(std::io::Error, String),
    /// Failed to read a directory
    DirRead(std::io::Error, String),
    /// Failed to read the metadata of a file
    FileStat(std::io::Error, String),
    /// Failed to copy a file
    FileCopy(std::io::Error, String, String),
    /// Failed to move a file
    FileRename(std::io::Error, String, String),
    /// Failed to remove a file
    FileRemove(std::io::Error, String),
}

impl Error {
    /// the underlying io error
    #[must_use]
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            Error::DirCreate(e, _)
            | Error::DirRead(e, _)
            | Error::FileStat(e, _)
            | Error::FileCopy(e, _, _)
            | Error::FileRename(e, _, _)
            | Error::FileRemove(e, _) => e,
        }
    }

    /// `true` if the error was caused by a missing file or directory
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.io_error().kind() == std::io::ErrorKind::NotFound
    }
}

impl Display for Error {
    fn fmt(&self, w: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DirCreate(e, d) => write!(w, "Failed to create directory `{d}`: {e}"),
            Error::DirRead(e, d) => write!(w, "Failed to read directory `{d}`: {e}"),
            Error::FileStat(e, f) => write!(w, "Failed to stat file `{f}`: {e}"),
            Error::FileCopy(e, from, to) => write!(w, "Failed to copy `{from}` to `{to}`: {e}"),
            Error::FileRename(e, from, to) => write!(w, "Failed to move `{from}` to `{to}`: {e}"),
            Error::FileRemove(e, f) => write!(w, "Failed to remove file `{f}`: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.io_error())
    }
}
