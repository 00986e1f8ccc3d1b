use super::{Minion, MinionExitReason, ToPoolMessage};
use crate::error::{Error, ErrorKind};
use crate::messages::RelayMessage;
use tracing::{debug, info, trace, warn};

impl Minion {
    /// Handle one text frame. Returns the exit reason when the subscription is over.
    pub(super) fn handle_nostr_message(
        &self,
        ws_message: &str,
    ) -> Result<Option<MinionExitReason>, Error> {
        trace!("{}: Handling message {}", &self.url, ws_message);

        let relay_message = match RelayMessage::from_wire(ws_message) {
            Ok(m) => m,
            Err(e) => {
                warn!("{}: Ignoring message: {}", &self.url, e);
                return Ok(None);
            }
        };

        match relay_message {
            RelayMessage::Event(subid, event) => {
                if subid != self.subid {
                    debug!("{}: EVENT for unknown subscription {}", &self.url, subid);
                } else if !self.filter.event_matches(&event) {
                    debug!("{}: Ignoring event {} outside the filter", &self.url, event.id);
                } else if !event.verify() {
                    warn!("{}: Ignoring event {} that fails verification", &self.url, event.id);
                } else if self
                    .to_pool
                    .send(ToPoolMessage::Event(self.url.clone(), event))
                    .is_err()
                {
                    return Ok(Some(MinionExitReason::Cancelled));
                }
            }
            RelayMessage::Eose(subid) => {
                if subid == self.subid {
                    debug!("{}: EOSE", &self.url);
                    return Ok(Some(MinionExitReason::Completed));
                }
                warn!("{}: EOSE for unknown subscription {}", &self.url, subid);
            }
            RelayMessage::Closed(subid, message) => {
                if subid == self.subid {
                    return Err(ErrorKind::RelayClosedSubscription(message).into());
                }
                warn!("{}: CLOSED for unknown subscription {}", &self.url, subid);
            }
            RelayMessage::Notice(message) => {
                info!("{}: NOTICE: {}", &self.url, message);
            }
            RelayMessage::Ok(id, ok, message) => {
                debug!("{}: OK: {} {} {}", &self.url, id, ok, message);
            }
            RelayMessage::Auth(challenge) => {
                debug!("{}: AUTH requested ({}), not answering", &self.url, challenge);
            }
        }

        Ok(None)
    }
}
