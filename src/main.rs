// Copyright 2026 The credsift authors
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

use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};

use libcredsift::cmdline::{expand_user, ScanConfig};
use libcredsift::store::ArtifactStore;
use libcredsift::{cmdline, discover, ignore, report, rules, EXIT_CODE_UNSUPPRESSED};

fn main() {
    let config = cmdline::ScanConfig::parse();

    env_logger::Builder::new()
        .filter_level(if config.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    process::exit(run(config));
}

fn run(config: ScanConfig) -> i32 {
    // Load and compile the rule pack up front; a bad pack is fatal before
    // any scanning starts.
    let rule_pack_path = expand_user(&config.rule_pack);
    info!("attempting to load rule pack from {}", rule_pack_path.display());
    let pack = match rules::pack_from_file(&rule_pack_path) {
        Ok(pack) => pack,
        Err(err) => {
            error!("unable to load rule pack: {:#}", err);
            return -1;
        }
    };
    let ruleset = match rules::Ruleset::compile(&pack) {
        Ok(ruleset) => Arc::new(ruleset),
        Err(err) => {
            error!("unable to compile rule pack: {:#}", err);
            return -1;
        }
    };
    info!("loaded {} rules", ruleset.len());

    let ignore_list = match &config.ignore_list {
        Some(path) => {
            let path = expand_user(path);
            info!("attempting to load ignore list from {}", path.display());
            match ignore::from_file(&path) {
                Ok(list) => Some(list),
                Err(err) => {
                    error!("unable to load ignore list: {:#}", err);
                    return -1;
                }
            }
        }
        None => None,
    };

    let store = match ArtifactStore::create(&config.cache_directory) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!("unable to create cache directory: {:#}", err);
            return -2;
        }
    };

    // Discover and expand all input files.
    let cancel = Arc::new(AtomicBool::new(false));
    let skip_on_corrupt = config.skip_unprocessable;
    info!("attempting to get a list of files to scan");
    let artifacts = match discover::discover(
        &config.paths,
        &store,
        config.threads,
        skip_on_corrupt,
        &cancel,
    ) {
        Ok(artifacts) => artifacts,
        Err(err) => {
            error!("unable to generate file list: {:#}", err);
            store.cleanup();
            return -2;
        }
    };
    info!("found {} files for analysis", artifacts.len());

    // Run the matcher over everything that is not itself an archive.
    let findings = match rules::run(
        &artifacts,
        &ruleset,
        config.threads,
        skip_on_corrupt,
        &cancel,
    ) {
        Ok(findings) => findings,
        Err(err) => {
            error!("unable to scan input files: {:#}", err);
            store.cleanup();
            return -2;
        }
    };

    // Fold the ignore list over the findings.
    let findings = match &ignore_list {
        Some(list) => match ignore::process(findings, list) {
            Ok(findings) => findings,
            Err(err) => {
                error!("unable to apply ignore list: {:#}", err);
                store.cleanup();
                return -1;
            }
        },
        None => findings,
    };
    info!("found {} findings", findings.len());

    // Render to stdout: SARIF by default, a tree when asked to be pretty.
    let scan_root = config.paths[0].display().to_string();
    let rendered = if config.pretty {
        report::pretty::render(&findings)
    } else {
        report::sarif::render(&scan_root, &findings)
    };
    let unsuppressed = findings.iter().filter(|f| !f.is_suppressed()).count();

    store.cleanup();

    match rendered {
        Ok(rendered) => println!("{}", rendered),
        Err(err) => {
            error!("unable to render findings: {:#}", err);
            return -3;
        }
    }

    if unsuppressed > 0 {
        EXIT_CODE_UNSUPPRESSED
    } else {
        0
    }
}
