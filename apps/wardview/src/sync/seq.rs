/// Monotonic request ids for one scope's snapshot fetches. Each session owns
/// its own counter; two concurrent scopes never share one. A response is
/// applied only while its id is still the latest issued, which stops a slow,
/// older response from clobbering a view model already updated by a newer
/// one.
#[derive(Debug, Default)]
pub struct RequestSeq {
    next: u64,
    latest: Option<u64>,
}

impl RequestSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        self.latest = Some(id);
        id
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.latest == Some(id)
    }
}
