//! typical imports needed when driving an attack
pub use crate::auth::{AuthConfig, AuthState, Authenticator, CredentialPlacement, CredentialStore};
pub use crate::classifier::SuccessCriteria;
pub use crate::corpora::{CharsetCorpus, Corpus, CorpusType, Named, Wordlist};
pub use crate::error::{SiegelineError, TransportErrorKind};
pub use crate::executor::{AttemptExecutor, TargetConfig};
pub use crate::generator::{Attempt, AttemptId, CombinationStream};
pub use crate::params::ParameterSpace;
pub use crate::payload::{FieldTarget, Payload, PayloadField};
pub use crate::responses::{AttemptResponse, AttemptResult, Outcome};
pub use crate::scheduler::{RunSummary, Scheduler};
pub use crate::sink::{JsonLinesSink, NullSink, ResultSink, SuccessRecord};
pub use crate::statistics::Statistics;
