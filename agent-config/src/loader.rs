//! YAML loading for the three configuration documents.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{
    AgentEntry, AgentsDocument, CapabilitiesDocument, CapabilityEntry, Definitions, OrderedMap,
    ToolEntry, ToolsDocument,
};

const INLINE_ORIGIN: &str = "<inline>";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    tools: OrderedMap<ToolEntry>,
    #[serde(default)]
    capabilities: OrderedMap<CapabilityEntry>,
    #[serde(default)]
    agents: OrderedMap<AgentEntry>,
}

/// Tool, capability and agent documents gathered from one or more files.
///
/// Any file may carry any of the `tools:`, `capabilities:` and `agents:`
/// sections. Entries with the same key in two files are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocuments {
    /// Tool entries.
    pub tools: ToolsDocument,
    /// Capability entries.
    pub capabilities: CapabilitiesDocument,
    /// Agent entries.
    pub agents: AgentsDocument,
}

impl ConfigDocuments {
    /// Parses a single YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid document.
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Self::parse(yaml, INLINE_ORIGIN)
    }

    /// Reads and merges YAML files in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`], [`ConfigError::Parse`] or
    /// [`ConfigError::DuplicateEntry`].
    pub fn from_yaml_files<I, P>(paths: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut documents = Self::default();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            documents.merge(Self::parse(&text, &path.display().to_string())?)?;
        }
        info!(
            tools = documents.tools.tools.len(),
            capabilities = documents.capabilities.capabilities.len(),
            agents = documents.agents.agents.len(),
            "configuration documents loaded"
        );
        Ok(documents)
    }

    /// Appends every entry of `other`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateEntry`] on the first repeated key.
    pub fn merge(&mut self, other: Self) -> ConfigResult<()> {
        self.tools.tools.extend_unique(other.tools.tools, "tool")?;
        self.capabilities
            .capabilities
            .extend_unique(other.capabilities.capabilities, "capability")?;
        self.agents.agents.extend_unique(other.agents.agents, "agent")
    }

    /// Converts the documents into validated definitions.
    ///
    /// # Errors
    ///
    /// See [`Definitions::from_documents`].
    pub fn into_definitions(self) -> ConfigResult<Definitions> {
        Definitions::from_documents(self.tools, self.capabilities, self.agents)
    }

    fn parse(yaml: &str, origin: &str) -> ConfigResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            origin: origin.to_owned(),
            source,
        })?;
        Ok(Self {
            tools: ToolsDocument { tools: file.tools },
            capabilities: CapabilitiesDocument {
                capabilities: file.capabilities,
            },
            agents: AgentsDocument {
                agents: file.agents,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    const TOOLS: &str = r"
tools:
  ddg_search:
    function: tools.search_functions.ddg_search
    description: Search the web
    function_type: search
    parameters:
      topic: {type: string, required: true}
";

    const CAPABILITIES: &str = r"
capabilities:
  information_retrieval:
    name: information_retrieval
    description: Find information
    function_types: [search, web]
agents:
  SearchAgent:
    description: Finds things
    capabilities: [information_retrieval]
";

    #[test]
    fn merges_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools.yaml");
        let capabilities = dir.path().join("capabilities.yaml");
        std::fs::File::create(&tools)
            .unwrap()
            .write_all(TOOLS.as_bytes())
            .unwrap();
        std::fs::write(&capabilities, CAPABILITIES).unwrap();

        let documents = ConfigDocuments::from_yaml_files([&tools, &capabilities]).unwrap();
        assert_eq!(documents.tools.tools.keys(), ["ddg_search"]);
        assert_eq!(documents.agents.agents.keys(), ["SearchAgent"]);

        let definitions = documents.into_definitions().unwrap();
        assert_eq!(definitions.capabilities[0].name(), "information_retrieval");
        assert_eq!(definitions.agents[0].capabilities(), ["information_retrieval"]);
    }

    #[test]
    fn repeated_entries_across_files_fail() {
        let mut documents = ConfigDocuments::from_yaml_str(TOOLS).unwrap();
        let err = documents
            .merge(ConfigDocuments::from_yaml_str(TOOLS).unwrap())
            .expect_err("duplicate tool");
        assert!(matches!(
            err,
            ConfigError::DuplicateEntry { kind: "tool", name } if name == "ddg_search"
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ConfigDocuments::from_yaml_files(["/definitely/not/here.yaml"]).expect_err("missing");
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn malformed_yaml_reports_origin() {
        let err = ConfigDocuments::from_yaml_str("tools: [unclosed").expect_err("bad yaml");
        assert!(matches!(err, ConfigError::Parse { ref origin, .. } if origin == "<inline>"));
    }

    #[test]
    fn empty_document_is_empty() {
        let documents = ConfigDocuments::from_yaml_str("  \n").unwrap();
        assert_eq!(documents, ConfigDocuments::default());
    }
}
