use crate::media::MediaAcquisitionError;
use crate::peer::PeerErrors;

#[derive(thiserror::Error, Debug)]
pub enum NegotiationErrors {
    #[error(transparent)]
    Media(#[from] MediaAcquisitionError),
    #[error("Negotiation failed to {stage}: {source}")]
    Negotiation {
        stage: &'static str,
        source: PeerErrors,
    },
    #[error("Could not apply remote ICE candidate: {0}")]
    IceApply(PeerErrors),
}

pub(super) trait Stage<T> {
    fn during(self, stage: &'static str) -> Result<T, NegotiationErrors>;
}

impl<T> Stage<T> for Result<T, PeerErrors> {
    fn during(self, stage: &'static str) -> Result<T, NegotiationErrors> {
        self.map_err(|source| NegotiationErrors::Negotiation { stage, source })
    }
}
