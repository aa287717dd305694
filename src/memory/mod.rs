pub mod conversation;
pub mod index;
pub mod persistence;

pub use conversation::{render_turns, ConversationTurn, MemoryManager, Role};
pub use index::{IndexQuery, IndexedEmail, InMemoryEmailIndex, ScoredCandidate, SemanticIndex};
pub use persistence::SessionStore;
