use super::{open_document, resolve_path};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use timeline_editor::{Document, ParameterValue};
use timeline_serve::ServeLayer;

#[derive(Debug, Args)]
pub struct TriggerArgs {
    /// Timeline document
    pub file: PathBuf,

    /// xml:id of the event template
    pub id: String,

    /// Parameter as NAME=VALUE or PATH=VALUE (repeatable)
    #[arg(short, long = "param")]
    pub params: Vec<String>,

    /// Write the resulting document here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite the input document
    #[arg(long, conflicts_with = "output")]
    pub in_place: bool,

    /// Print the recorded generations as JSON
    #[arg(long)]
    pub operations: bool,
}

pub fn trigger(args: TriggerArgs, cwd: &str) -> Result<()> {
    instantiate(args, cwd, false)
}

pub fn enqueue(args: TriggerArgs, cwd: &str) -> Result<()> {
    instantiate(args, cwd, true)
}

fn instantiate(args: TriggerArgs, cwd: &str, queued: bool) -> Result<()> {
    let config = Config::load(cwd)?;
    let path = resolve_path(cwd, &args.file);
    let doc = Arc::new(open_document(&path, &config)?);
    let layer = Arc::new(ServeLayer::new(&config.serve));
    layer.attach(&doc);

    let parameters = parse_parameters(&doc, &args.id, &args.params)?;
    let new_id = if queued {
        doc.events().enqueue(&args.id, &parameters)?
    } else {
        doc.events().trigger(&args.id, &parameters)?
    };
    println!(
        "{} {} {} → {}",
        "✓".green(),
        if queued { "Enqueued" } else { "Triggered" },
        args.id,
        new_id.bold()
    );

    if args.operations {
        for entry in layer.history_since(0) {
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }

    let target = if args.in_place { Some(path) } else { args.output.map(|o| resolve_path(cwd, &o)) };
    if let Some(target) = target {
        doc.save(&target.display().to_string())?;
        println!("  {} Saved {}", "✓".green(), target.display());
    }
    Ok(())
}

/// `NAME=VALUE` pairs are matched against the declared parameter names of
/// the event; anything starting with `/` is taken as a parameter path.
fn parse_parameters(doc: &Document, id: &str, raw: &[String]) -> Result<Vec<ParameterValue>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let listing = doc.events().list_events()?;
    let event = listing
        .events
        .iter()
        .find(|e| e.id.as_deref() == Some(id))
        .ok_or_else(|| anyhow!("No event with id {}", id))?;

    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected NAME=VALUE, got {}", pair))?;
            if key.starts_with('/') {
                return Ok(ParameterValue::new(key, value));
            }
            event
                .parameters
                .iter()
                .find(|p| p.name.as_deref() == Some(key))
                .map(|p| ParameterValue::new(p.parameter.clone(), value))
                .ok_or_else(|| anyhow!("Event {} has no parameter {}", id, key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::open_document;

    const DOC: &str = r#"<tl:document xmlns:tl="http://jackjansen.nl/timelines" xmlns:tt="http://jackjansen.nl/2immerse/livetrigger">
  <tl:par xml:id="main">
    <tt:events>
      <tl:par xml:id="goal" tt:name="Goal">
        <tt:parameters>
          <tt:parameter tt:name="Duration" tt:parameter="./tl:sleep/@tl:dur" tt:type="number" />
        </tt:parameters>
        <tl:sleep tl:dur="1" />
      </tl:par>
    </tt:events>
  </tl:par>
</tl:document>"#;

    fn write_document(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("match.xml");
        std::fs::write(&path, DOC).unwrap();
        path
    }

    #[test]
    fn test_parameters_by_name_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let doc = open_document(&write_document(&dir), &Config::default()).unwrap();
        assert_eq!(doc.id(), "match");

        let parameters = parse_parameters(&doc, "goal", &["Duration=4".to_string()]).unwrap();
        assert_eq!(
            parameters[0].parameter,
            "/tl:document/tl:par[1]/tt:events[1]/tl:par[1]/tt:parameters[1]/tt:parameter[1]"
        );
        assert_eq!(parameters[0].value, "4");

        let by_path = parse_parameters(&doc, "goal", &["/x/y=1".to_string()]).unwrap();
        assert_eq!(by_path[0].parameter, "/x/y");

        assert!(parse_parameters(&doc, "goal", &["Nope=1".to_string()]).is_err());
        assert!(parse_parameters(&doc, "goal", &["Duration".to_string()]).is_err());
        assert!(parse_parameters(&doc, "missing", &["Duration=1".to_string()]).is_err());
    }

    #[test]
    fn test_trigger_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(&dir);
        let args = TriggerArgs {
            file: path.clone(),
            id: "goal".to_string(),
            params: vec!["Duration=4".to_string()],
            output: None,
            in_place: true,
            operations: false,
        };
        trigger(args, dir.path().to_str().unwrap()).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains(r#"xml:id="goal-1""#));
        assert!(saved.contains(r#"tl:dur="4""#));
        assert!(!saved.contains("tls:state"));
    }
}
