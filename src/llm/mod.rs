pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockDecisionClient, MockScorer};
pub use openai::{OpenAiDecisionClient, OpenAiScorer};
pub use traits::{DecisionClient, EntailmentScorer, EntailmentScores};
