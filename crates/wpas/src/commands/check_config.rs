//! `wpas check-config`: report every configuration problem at once.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Problem {
    problem: String,
}

#[derive(Tabled)]
struct ProblemRow {
    #[tabled(rename = "Problem")]
    problem: String,
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let path = super::config_file(global);
    let cfg = super::load(global)?;
    let problems: Vec<Problem> = cfg
        .problems()
        .into_iter()
        .map(|err| Problem {
            problem: err.to_string(),
        })
        .collect();

    if problems.is_empty() {
        if !global.quiet {
            eprintln!(
                "{}: {} network(s), {} AP interface(s)",
                path.display(),
                cfg.networks.len(),
                cfg.ap.len()
            );
        }
        return Ok(());
    }

    let out = output::render_list(
        global.output,
        &problems,
        |p| ProblemRow {
            problem: p.problem.clone(),
        },
        |p| p.problem.clone(),
    );
    output::print_output(&out, global.quiet);
    Err(CliError::InvalidConfig {
        count: problems.len(),
        path: path.display().to_string(),
    })
}
