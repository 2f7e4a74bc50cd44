//! Agent contract, the in-process registry and manifest-driven plugin
//! loader, and the five built-in agent implementations: Context, Retrieval,
//! Security, Compliance, and Coding.

mod coding_agent;
mod compliance_agent;
mod context_agent;
mod contract;
mod loader;
mod registry;
mod retrieval_agent;
mod security_agent;

pub use coding_agent::CodingAgent;
pub use compliance_agent::ComplianceAgent;
pub use context_agent::{derive_project_type, extract_facts, ContextAgent, ExtractedFacts};
pub use contract::{Agent, StatusCell};
pub use loader::PluginLoader;
pub use registry::{AgentFactory, AgentRegistry};
pub use retrieval_agent::{optimize_query, select_domains, OutputMode, RetrievalAgent};
pub use security_agent::{validate_code, SecurityAgent};
