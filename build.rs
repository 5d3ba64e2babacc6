// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io;
use std::path::Path;

/// Common argument: resolver configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("addonpm.toml")
        .help("Resolver configuration file")
}

/// Repeatable package token argument
fn package_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("PACKAGE")
        .action(ArgAction::Append)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("addonpm")
        .version(env!("CARGO_PKG_VERSION"))
        .author("addonpm Contributors")
        .about("Add-on package resolver")
        .subcommand_required(true)
        .subcommand(
            Command::new("resolve")
                .about("Compute an install/upgrade/remove plan")
                .arg(config_arg())
                .arg(package_arg("install", "Package to install (id, name, or name:range)"))
                .arg(package_arg("remove", "Package to remove"))
                .arg(package_arg("upgrade", "Package to upgrade"))
                .arg(
                    Arg::new("target_platform")
                        .long("target-platform")
                        .value_name("PLATFORM")
                        .help("Override the configured target platform"),
                )
                .arg(
                    Arg::new("allow_snapshot")
                        .long("allow-snapshot")
                        .action(ArgAction::SetTrue)
                        .help("Admit every SNAPSHOT version"),
                )
                .arg(
                    Arg::new("no_keep")
                        .long("no-keep")
                        .action(ArgAction::SetTrue)
                        .help("Do not try to keep installed packages"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .help("Solver deadline in seconds"),
                ),
        )
        .subcommand(
            Command::new("updates")
                .about("List remote packages that update installed ones")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List the highest version of every known package")
                .arg(config_arg())
                .arg(
                    Arg::new("type")
                        .long("type")
                        .value_parser(["addon", "hotfix", "studio", "bundle"])
                        .help("Only list packages of this type"),
                ),
        )
        .subcommand(
            Command::new("cudf")
                .about("Print the CUDF universe for an install request")
                .arg(config_arg())
                .arg(package_arg("install", "Package to install (id, name, or name:range)")),
        )
}

/// Render the man page for the CLI into `man/addonpm.1`
fn write_man_page(out_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(out_dir)?;
    let mut page = fs::File::create(out_dir.join("addonpm.1"))?;
    Man::new(build_cli()).render(&mut page)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let Some(manifest_dir) = env::var_os("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR not set, skipping man page");
        return;
    };
    if let Err(e) = write_man_page(&Path::new(&manifest_dir).join("man")) {
        println!("cargo:warning=Man page not generated: {}", e);
    }
}
