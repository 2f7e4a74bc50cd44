//! Trait contracts for the collaborators the orchestration runtime treats
//! as external and out of scope: the LLM provider, the vector store, the
//! static-analysis scanner, the rule-file parser, the file analyzer, and
//! the markdown report renderer. Each trait ships a light built-in
//! implementation for tests and `demo` mode, mirroring how `tandem-
//! providers` ships a `LocalEchoProvider` alongside the real ones.

mod file_analyzer;
mod llm;
mod report;
mod rules;
mod scanner;
mod vector_store;

pub use file_analyzer::{FileAnalysis, FileAnalyzer, HeuristicFileAnalyzer};
pub use llm::{
    ChatMessage, LlmConfig, LlmProvider, LlmResponse, LocalEchoLlmProvider, StreamChunk, ToolCall,
    ToolSchema, TokenUsage,
};
pub use report::{MarkdownReportRenderer, ReportRenderer, WorkflowReport};
pub use rules::{JsonYamlRuleParser, Rule, RuleFileParser};
pub use scanner::{NoopScanner, ScanFinding, ScanSeverity, StaticAnalysisScanner};
pub use vector_store::{Document, InMemoryVectorStore, SearchConfig, SearchResult, VectorStore};
