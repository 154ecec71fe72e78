// In-process scan service

use crate::remote::{RemoteError, RemoteResult, ScanId, ScanInfo, ScanService, ScanState};
use crate::scan::ScanCommand;
use crate::xml;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
struct StoredScan {
    name: String,
    /// Wire text, so fetch goes through the same codec as a real server
    xml: String,
    state: ScanState,
}

#[derive(Debug)]
struct Scans {
    next_id: u64,
    scans: BTreeMap<ScanId, StoredScan>,
}

/// Scan service that keeps submitted scans in memory
///
/// Ids are allocated from 1. The service can be taken offline to exercise
/// `ServiceUnavailable` handling and refuses loops whose step is zero, which
/// a real server cannot execute.
#[derive(Debug)]
pub struct MemoryScanService {
    scans: Mutex<Scans>,
    online: AtomicBool,
}

impl MemoryScanService {
    pub fn new() -> Self {
        Self {
            scans: Mutex::new(Scans {
                next_id: 1,
                scans: BTreeMap::new(),
            }),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Move a stored scan to another state, false if the id is unknown
    pub fn set_state(&self, id: ScanId, state: ScanState) -> bool {
        match self.scans.lock() {
            Ok(mut scans) => match scans.scans.get_mut(&id) {
                Some(scan) => {
                    scan.state = state;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.scans.lock().map(|scans| scans.scans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::ServiceUnavailable(
                "Scan service is offline".to_string(),
            ))
        }
    }

    fn lock(&self) -> RemoteResult<std::sync::MutexGuard<'_, Scans>> {
        self.scans
            .lock()
            .map_err(|_| RemoteError::ServiceUnavailable("Scan store poisoned".to_string()))
    }
}

impl Default for MemoryScanService {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(commands: &[ScanCommand]) -> RemoteResult<()> {
    for command in commands {
        if let ScanCommand::Loop { device, step, .. } = command
            && *step == 0.0
        {
            return Err(RemoteError::RejectedCommand(format!(
                "Loop over '{}' has zero step",
                device
            )));
        }
        validate(command.children())?;
    }
    Ok(())
}

impl ScanService for MemoryScanService {
    fn submit(&self, name: &str, commands: &[ScanCommand]) -> RemoteResult<ScanId> {
        self.check_online()?;
        validate(commands)?;
        let xml = xml::encode_string(commands)?;

        let mut scans = self.lock()?;
        let id = ScanId(scans.next_id);
        scans.next_id += 1;
        scans.scans.insert(
            id,
            StoredScan {
                name: name.to_string(),
                xml,
                state: ScanState::Idle,
            },
        );
        tracing::debug!(scan = %id, name, "Stored scan");
        Ok(id)
    }

    fn fetch(&self, id: ScanId) -> RemoteResult<Vec<ScanCommand>> {
        self.check_online()?;
        let xml = {
            let scans = self.lock()?;
            scans
                .scans
                .get(&id)
                .map(|scan| scan.xml.clone())
                .ok_or(RemoteError::NotFound(id))?
        };
        Ok(xml::decode_str(&xml)?)
    }

    fn query_status(&self, id: ScanId) -> RemoteResult<ScanInfo> {
        self.check_online()?;
        let scans = self.lock()?;
        let scan = scans.scans.get(&id).ok_or(RemoteError::NotFound(id))?;
        Ok(ScanInfo {
            id,
            name: scan.name.clone(),
            state: scan.state,
            percentage: match scan.state {
                ScanState::Finished | ScanState::Logged => Some(100),
                ScanState::Idle => Some(0),
                _ => None,
            },
            error: None,
        })
    }
}
