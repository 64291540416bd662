pub mod claude;
pub mod conversation;
pub mod prompts;
pub mod research;

pub use claude::{parse_transcript, ClaudeCli, ClaudeError, Reply, StreamEvent};
pub use conversation::{ConversationLedger, Usage};
pub use prompts::CommandPrompts;
pub use research::{slugify_topic, spawn_research};
