//! Reading workflow and agent definition files.
//!
//! Files ending in `.toml` are parsed as TOML; everything else as JSON.

use std::path::Path;

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use weft_core::{Agent, Variables, Workflow};

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn read_definition<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if is_toml(path) {
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Loads a workflow definition.
pub fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    read_definition(path)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AgentsFile {
    List(Vec<Agent>),
    Table { agents: Vec<Agent> },
}

/// Loads agent definitions in file order.
///
/// JSON files may hold a bare array or an object with an `agents` array;
/// TOML files use `[[agents]]` tables.
pub fn load_agents(path: &Path) -> anyhow::Result<Vec<Agent>> {
    let agents = match read_definition::<AgentsFile>(path)? {
        AgentsFile::List(agents) | AgentsFile::Table { agents } => agents,
    };
    if agents.is_empty() {
        bail!("{} defines no agents", path.display());
    }
    Ok(agents)
}

/// Parses `key=value` pairs into variables.
///
/// Values are read as JSON when they parse, so `n=3` binds a number and
/// `items=[1,2]` an array; anything else is bound as a string.
pub fn parse_vars(pairs: &[String]) -> anyhow::Result<Variables> {
    let mut vars = Variables::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid variable '{}': expected KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid variable '{}': empty key", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&[
            "topic=rust".to_string(),
            "n=3".to_string(),
            "items=[1,2]".to_string(),
            "eq=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(vars["topic"], json!("rust"));
        assert_eq!(vars["n"], json!(3));
        assert_eq!(vars["items"], json!([1, 2]));
        assert_eq!(vars["eq"], json!("a=b"));

        assert!(parse_vars(&["novalue".to_string()]).is_err());
        assert!(parse_vars(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_load_workflow_json_and_toml() {
        let dir = TempDir::new().unwrap();

        let json_path = dir.path().join("wf.json");
        fs::write(
            &json_path,
            r#"{"id": "wf", "name": "WF", "steps": [
                {"id": "a", "kind": "ai_agent", "agent": "writer", "prompt": "hi"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(load_workflow(&json_path).unwrap().steps.len(), 1);

        let toml_path = dir.path().join("wf.toml");
        fs::write(
            &toml_path,
            r#"
id = "wf"
name = "WF"

[variables]
topic = "tides"

[[steps]]
id = "a"
kind = "ai_agent"
agent = "writer"
prompt = "About {{topic}}"

[[steps]]
id = "b"
kind = "ai_agent"
agent = "critic"
prompt = "Review {{a}}"
dependencies = ["a"]
"#,
        )
        .unwrap();
        let workflow = load_workflow(&toml_path).unwrap();
        assert_eq!(workflow.steps[1].dependencies, vec!["a"]);
        assert_eq!(workflow.variables["topic"], json!("tides"));
    }

    #[test]
    fn test_load_agents_shapes() {
        let dir = TempDir::new().unwrap();

        let list = dir.path().join("list.json");
        fs::write(&list, r#"[{"id": "a", "name": "A", "model": "m"}]"#).unwrap();
        assert_eq!(load_agents(&list).unwrap()[0].id, "a");

        let table = dir.path().join("agents.toml");
        fs::write(
            &table,
            r#"
[[agents]]
id = "a"
name = "A"
model = "m"

[[agents]]
id = "b"
name = "B"
model = "m"
"#,
        )
        .unwrap();
        let agents = load_agents(&table).unwrap();
        assert_eq!(agents.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "[]").unwrap();
        assert!(load_agents(&empty).is_err());
    }
}
