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

#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::unnecessary_unwrap,
    clippy::pedantic,
    clippy::mod_module_files
)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate log;

use clap::Parser;

use crate::cli::{Cli, Command};

mod cli;
mod error_files;
mod logging;
mod run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::setup(cli.logger_config.as_deref())?;
    let res = match &cli.command {
        Command::Run(run) => run.run().await,
        Command::Test(target) => target.test().await,
        Command::Errors(errors) => errors.run().await,
    };
    if let Err(e) = &res {
        error!("error: {e}");
        for cause in e.chain().skip(1) {
            error!("caused by: {cause}");
        }
    }
    res
}
