pub mod campaign;
pub mod job;
pub mod keyword;
pub mod limits;
pub mod params;
pub mod persona;
pub mod proxy;
pub mod requests;
pub mod results;
pub mod wire;

pub use campaign::{Campaign, CampaignKind, CampaignStatus};
pub use job::{CampaignJob, JobStatus};
pub use limits::{ValidationError, ValidationResult};
pub use persona::{Persona, PersonaKind};
pub use proxy::{Proxy, ProxyProtocol, ProxySelectionStrategy};
