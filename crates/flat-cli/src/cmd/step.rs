use crate::output::{print_json, print_table};
use anyhow::anyhow;
use clap::Subcommand;
use flat_core::model::{PullConfig, SqlFormat, Step};
use std::path::Path;

#[derive(Subcommand)]
pub enum StepSubcommand {
    /// Append a step that downloads a URL
    AddHttp {
        job: String,
        /// URL to fetch
        url: String,
        /// File name for the result, without extension
        #[arg(long)]
        outfile: Option<String>,
        /// Script to run on the downloaded file
        #[arg(long)]
        postprocess: Option<String>,
    },
    /// Append a step that runs a SQL query
    AddSql {
        job: String,
        /// Connection string, usually a secret reference
        #[arg(long)]
        connstring: String,
        /// Path of the file holding the query
        #[arg(long)]
        query_file: String,
        /// csv or json
        #[arg(long, default_value = "csv")]
        format: SqlFormat,
        /// File name for the result, without extension
        #[arg(long)]
        outfile: Option<String>,
        /// Script to run on the query result
        #[arg(long)]
        postprocess: Option<String>,
    },
    /// Remove the step at position N (0-based)
    Remove {
        job: String,
        #[arg(value_name = "N")]
        index: usize,
    },
    /// List a job's steps
    List { job: String },
}

pub fn run(root: &Path, subcmd: StepSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StepSubcommand::AddHttp {
            job,
            url,
            outfile,
            postprocess,
        } => {
            let config = PullConfig::Http {
                http_url: url,
                outfile_basename: outfile,
                postprocessing: postprocess,
            };
            add(root, job, config, json)
        }
        StepSubcommand::AddSql {
            job,
            connstring,
            query_file,
            format,
            outfile,
            postprocess,
        } => {
            let config = PullConfig::Sql {
                sql_connstring: connstring,
                sql_queryfile: query_file,
                sql_format: format,
                outfile_basename: outfile,
                postprocessing: postprocess,
            };
            add(root, job, config, json)
        }
        StepSubcommand::Remove { job, index } => {
            let done = format!("Removed step {index} from '{job}'.");
            let applied = super::mutate(root, move |s| {
                s.job_mut(&job)?.remove_step(index)?;
                Ok(())
            })?;
            super::report(&applied, &done, json)
        }
        StepSubcommand::List { job } => list(root, &job, json),
    }
}

fn add(root: &Path, job: String, config: PullConfig, json: bool) -> anyhow::Result<()> {
    let done = format!("Added {} step to '{job}'.", Step::pull(config.clone()).kind());
    let applied = super::mutate(root, move |s| {
        s.job_mut(&job)?.add_step(Step::pull(config));
        Ok(())
    })?;
    super::report(&applied, &done, json)
}

/// One-line description of what a step does.
fn summary(step: &Step) -> String {
    match step {
        Step::Checkout => "checkout".to_string(),
        Step::Pull {
            config: PullConfig::Http { http_url, .. },
        } => http_url.clone(),
        Step::Pull {
            config:
                PullConfig::Sql {
                    sql_queryfile,
                    sql_format,
                    ..
                },
        } => format!("{sql_queryfile} as {sql_format}"),
        Step::Push { config } => {
            let keys: Vec<&str> = config.fields.keys().map(String::as_str).collect();
            keys.join(", ")
        }
        Step::Opaque { step } => step
            .get("uses")
            .and_then(|u| u.as_str())
            .or_else(|| step.get("run").map(|_| "run"))
            .unwrap_or("unrecognized")
            .to_string(),
    }
}

fn list(root: &Path, job: &str, json: bool) -> anyhow::Result<()> {
    let state = super::load(root)?.state;
    let job = state
        .job(job)
        .ok_or_else(|| anyhow!("job '{job}' not found"))?;

    if json {
        return print_json(&job.steps);
    }
    if job.steps.is_empty() {
        println!("No steps.");
        return Ok(());
    }
    let rows = job
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let outfile = match step {
                Step::Pull { config } => config.outfile_basename().unwrap_or("-").to_string(),
                _ => "-".to_string(),
            };
            vec![i.to_string(), step.kind().to_string(), summary(step), outfile]
        })
        .collect();
    print_table(&["#", "KIND", "SOURCE", "OUTFILE"], rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_name_the_source() {
        let http = Step::pull(PullConfig::http("https://example.com/a.csv", "a"));
        assert_eq!(summary(&http), "https://example.com/a.csv");

        let sql = Step::pull(PullConfig::sql(
            "${{ secrets.DB }}",
            "q.sql",
            SqlFormat::Json,
            "q",
        ));
        assert_eq!(summary(&sql), "q.sql as json");

        let opaque: serde_yaml::Value = serde_yaml::from_str("uses: other/action@v1").unwrap();
        assert_eq!(summary(&Step::Opaque { step: opaque }), "other/action@v1");
    }
}
