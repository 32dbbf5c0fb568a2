use crate::mark::Mark;
use rle::SplitableSpan;

/// Walks a changeset one mark at a time, splitting marks when the caller only wants part of one.
/// The remainder of a split mark is returned by the next call.
///
/// I'd love to use a normal rust iterator here, but we need to pass in a limit each time we take
/// a mark.
#[derive(Debug)]
pub(crate) struct MarkQueue<'a, C> {
    marks: std::slice::Iter<'a, Mark<C>>,
    pending: Option<Mark<C>>,
}

impl<'a, C: Clone> MarkQueue<'a, C> {
    pub(crate) fn new(marks: &'a [Mark<C>]) -> Self {
        Self { marks: marks.iter(), pending: None }
    }

    fn fill(&mut self) {
        if self.pending.is_none() {
            // Zero length marks carry no information. Skip them.
            self.pending = self.marks.by_ref().find(|m| m.count > 0).cloned();
        }
    }

    pub(crate) fn peek(&mut self) -> Option<&Mark<C>> {
        self.fill();
        self.pending.as_ref()
    }

    /// Take at most `max_len` cells from the front of the queue.
    ///
    /// Panics if the queue is empty.
    pub(crate) fn dequeue_up_to(&mut self, max_len: u32) -> Mark<C> {
        assert!(max_len > 0);
        self.fill();
        let mut mark = self.pending.take().expect("Dequeued from an empty mark queue");
        if mark.count > max_len {
            self.pending = Some(mark.truncate(max_len as usize));
        }
        mark
    }
}
