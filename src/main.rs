//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las fases del proceso de compilación y expone
//! una CLI. Un error de compilación se reporta con su extracto de
//! código fuente y termina el proceso con un estado que distingue la
//! clase del error; el archivo de salida solo se crea cuando la
//! compilación completa tuvo éxito.

use anyhow::Context;
use clap::{crate_version, Arg, Command};
use compiler::{compile, link, link::EmitOptions};

use std::{fs, fs::File, process};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI; un conteo de argumentos incorrecto imprime el
    // uso y no compila nada
    let args = Command::new("compile")
        .version(crate_version!())
        .about("Compiler for a small imperative language targeting a six-register machine")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required(true)
                .help("Source program"),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .required(true)
                .help("Target listing, one instruction per line"),
        )
        .arg(
            Arg::new("unlinked")
                .short('S')
                .long("unlinked")
                .help("Dump labeled code without resolving jumps"),
        )
        .get_matches();

    let input = args.value_of("input").expect("input is required");
    let output = args.value_of("output").expect("output is required");

    let mut options = EmitOptions::empty();
    if args.is_present("unlinked") {
        options |= EmitOptions::UNLINKED;
    }

    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read source file: {}", input))?;

    let code = match compile(input, &text, options) {
        Ok(code) => code,
        Err(diagnostic) => {
            eprint!("{}", diagnostic);
            process::exit(diagnostic.status());
        }
    };

    let mut file = File::create(output)
        .with_context(|| format!("Failed to open for writing: {}", output))?;

    link::write_listing(&code, &mut file)
        .with_context(|| format!("Failed to write listing: {}", output))?;

    Ok(())
}
