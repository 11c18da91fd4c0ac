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

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;

/// OIBus cli - Command Line Interface
#[derive(Parser, Debug)]
#[clap(name = "oibus", author, version)]
pub(crate) struct Cli {
    /// Configuration for Log4RS
    #[clap(short, long, global = true, value_parser = clap::value_parser!(String))]
    pub(crate) logger_config: Option<String>,
    #[clap(subcommand)]
    pub(crate) command: Command,
}

#[derive(Parser, Debug)]
pub(crate) enum Command {
    /// Runs the engine until interrupted
    Run(Run),
    /// Tests the connection of a north connector
    Test(Target),
    /// Manages the files a north connector failed to deliver
    Errors(Errors),
}

#[derive(Parser, Debug)]
pub(crate) struct Run {
    /// Engine configuration file
    #[clap(short, long, value_parser = clap::value_parser!(PathBuf))]
    pub(crate) config: PathBuf,
}

#[derive(Parser, Debug)]
pub(crate) struct Target {
    /// Engine configuration file
    #[clap(short, long, value_parser = clap::value_parser!(PathBuf))]
    pub(crate) config: PathBuf,
    /// Id of the north connector
    #[clap(short, long, value_parser = clap::value_parser!(String))]
    pub(crate) north: String,
}

#[derive(Parser, Debug)]
pub(crate) struct Errors {
    #[clap(flatten)]
    pub(crate) target: Target,
    #[clap(subcommand)]
    pub(crate) command: ErrorsCommand,
}

#[derive(Parser, Debug)]
pub(crate) enum ErrorsCommand {
    /// Lists the quarantined files
    List {
        /// Only files whose name contains this
        #[clap(long, default_value = "", value_parser = clap::value_parser!(String))]
        name: String,
        /// Only files modified at or after this instant (RFC 3339)
        #[clap(long)]
        from: Option<DateTime<Utc>>,
        /// Only files modified at or before this instant (RFC 3339)
        #[clap(long)]
        to: Option<DateTime<Utc>>,
    },
    /// Enqueues quarantined files for delivery again
    Retry(Selection),
    /// Deletes quarantined files
    Remove(Selection),
}

#[derive(Parser, Debug)]
pub(crate) struct Selection {
    /// Select every quarantined file
    #[clap(short, long, action = clap::ArgAction::SetTrue, conflicts_with = "files")]
    pub(crate) all: bool,
    /// Names of the quarantined files
    #[clap(value_parser = clap::value_parser!(String), required_unless_present = "all")]
    pub(crate) files: Vec<String>,
}
