pub mod apply;
pub mod diff;
pub mod get;

use anyhow::{Result, bail};
use declarative::RequestedState;
use marathon::DefinitionSource;

use crate::cli::SourceArgs;

/// Build the definition source from `--app-json`, `--app` or `--app-id`
pub fn definition_source(args: &SourceArgs, state: RequestedState) -> Result<DefinitionSource> {
    if let Some(path) = args.file() {
        return Ok(DefinitionSource::File(path));
    }
    if let Some(json) = &args.app {
        return Ok(DefinitionSource::Inline(json.clone()));
    }
    if let Some(id) = &args.app_id {
        if state == RequestedState::Present {
            bail!("--app-id can only be used with --state absent; pass --app-json or --app");
        }
        return Ok(DefinitionSource::Id(id.clone()));
    }
    bail!("One of --app-json, --app or --app-id is required")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(app_json: Option<&str>, app: Option<&str>, app_id: Option<&str>) -> SourceArgs {
        SourceArgs {
            app_json: app_json.map(str::to_string),
            app: app.map(str::to_string),
            app_id: app_id.map(str::to_string),
        }
    }

    #[test]
    fn test_source_from_file() {
        let source =
            definition_source(&args(Some("/tmp/app.json"), None, None), RequestedState::Present)
                .unwrap();
        assert!(matches!(source, DefinitionSource::File(_)));
    }

    #[test]
    fn test_source_inline() {
        let source = definition_source(
            &args(None, Some(r#"{"id": "nginx"}"#), None),
            RequestedState::Present,
        )
        .unwrap();
        assert_eq!(
            source,
            DefinitionSource::Inline(r#"{"id": "nginx"}"#.to_string())
        );
    }

    #[test]
    fn test_app_id_only_for_absent() {
        let only_id = args(None, None, Some("nginx"));
        assert!(definition_source(&only_id, RequestedState::Present).is_err());
        assert_eq!(
            definition_source(&only_id, RequestedState::Absent).unwrap(),
            DefinitionSource::Id("nginx".to_string())
        );
    }
}
