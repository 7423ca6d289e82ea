//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - MCP tool descriptors and call results, exchanged with the tool server
//! - anthropic messages/tools, sent from the agent to the LLM
//!
//! We always immediately convert those wire formats into the internal structs using
//! to/from helpers, so the engine only ever sees these types.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
