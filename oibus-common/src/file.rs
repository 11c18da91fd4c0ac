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

//! Async file helpers that name the offending path in their errors

use std::{
    ffi::OsStr,
    fs::Metadata,
    path::{Path, PathBuf},
};

use crate::errors::Error;

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// A wrapper around `create_dir_all` that will give a better error (including the directory)
///
/// # Errors
///   * if the directory couldn't be created
pub async fn create_dir<S>(path: &S) -> Result<(), Error>
where
    S: AsRef<Path> + ?Sized,
{
    let p: &Path = path.as_ref();
    tokio::fs::create_dir_all(p)
        .await
        .map_err(|e| Error::DirCreate(e, display(p)))
}

/// A wrapper around `metadata` that will give a better error (including the filename)
///
/// # Errors
///   * if the file does not exist or can't be accessed
pub async fn stat<S>(path: &S) -> Result<Metadata, Error>
where
    S: AsRef<Path> + ?Sized,
{
    let p: &Path = path.as_ref();
    tokio::fs::metadata(p)
        .await
        .map_err(|e| Error::FileStat(e, display(p)))
}

/// Checks if the given path exists
pub async fn exists<S>(path: &S) -> bool
where
    S: AsRef<Path> + ?Sized,
{
    tokio::fs::metadata(path.as_ref()).await.is_ok()
}

/// A wrapper around `copy` that will give a better error (including both filenames)
///
/// # Errors
///   * if the file couldn't be copied
pub async fn copy<S, D>(from: &S, to: &D) -> Result<u64, Error>
where
    S: AsRef<Path> + ?Sized,
    D: AsRef<Path> + ?Sized,
{
    let (from, to): (&Path, &Path) = (from.as_ref(), to.as_ref());
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| Error::FileCopy(e, display(from), display(to)))
}

/// A wrapper around `rename` that will give a better error (including both filenames)
///
/// # Errors
///   * if the file couldn't be moved
pub async fn rename<S, D>(from: &S, to: &D) -> Result<(), Error>
where
    S: AsRef<Path> + ?Sized,
    D: AsRef<Path> + ?Sized,
{
    let (from, to): (&Path, &Path) = (from.as_ref(), to.as_ref());
    tokio::fs::rename(from, to)
        .await
        .map_err(|e| Error::FileRename(e, display(from), display(to)))
}

/// A wrapper around `remove_file` that will give a better error (including the filename)
///
/// # Errors
///   * if the file couldn't be removed
pub async fn remove<S>(path: &S) -> Result<(), Error>
where
    S: AsRef<Path> + ?Sized,
{
    let p: &Path = path.as_ref();
    tokio::fs::remove_file(p)
        .await
        .map_err(|e| Error::FileRemove(e, display(p)))
}

/// Lists the regular files inside a directory, sorted by name
///
/// # Errors
///   * if the directory couldn't be read
pub async fn list_files<S>(dir: &S) -> Result<Vec<PathBuf>, Error>
where
    S: AsRef<Path> + ?Sized,
{
    let d: &Path = dir.as_ref();
    let mut entries = tokio::fs::read_dir(d)
        .await
        .map_err(|e| Error::DirRead(e, display(d)))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::DirRead(e, display(d)))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or_default();
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Gets the extesion for a filename
#[must_use]
pub fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(OsStr::to_str)
}

/// Gets the file name of a path as a string
#[must_use]
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(OsStr::to_str)
}
