//! Tool capabilities, the registry, and the safety boundaries around them.

pub mod bash;
pub mod edit_patch;
pub mod fetch_webpage;
pub mod json_args;
pub mod list_dir;
pub mod network_policy;
pub mod path_policy;
pub mod read;
pub mod registry;
pub mod tool;
pub mod write;
pub mod web_search;

pub use registry::Registry;
pub use tool::{Tool, ToolContext};

use std::sync::Arc;

use bash::{BashTool, CommandPolicy};
use edit_patch::EditPatchTool;
use fetch_webpage::FetchWebPageTool;
use list_dir::ListDirTool;
use network_policy::NetworkPolicy;
use read::ReadTool;
use web_search::{WebSearchConfig, WebSearchOllamaTool};
use write::WriteTool;

/// Build a registry containing all seven built-in tools.
pub fn default_registry(
    command_policy: CommandPolicy,
    network_policy: NetworkPolicy,
    search_config: WebSearchConfig,
) -> Registry {
    Registry::new(vec![
        Arc::new(BashTool::new(command_policy)),
        Arc::new(ReadTool),
        Arc::new(WriteTool),
        Arc::new(EditPatchTool),
        Arc::new(ListDirTool),
        Arc::new(FetchWebPageTool::new(network_policy.clone())),
        Arc::new(WebSearchOllamaTool::new(search_config, network_policy)),
    ])
}
