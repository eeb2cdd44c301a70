//! Directory listing: the one operation answered in several messages.
//!
//! Entries are buffered and shipped as partial replies whenever the buffer
//! reaches the configured limit or the flush deadline passes, so that a
//! slow listing keeps the requester from timing out. The last message is
//! the request itself, marked final, carrying whatever is left and the
//! total number of messages sent.

use std::time::{Duration, Instant};

use nsm_cells::{DeferredReply, Message};
use nsm_types::{FileAttributes, Result, Status};
use tracing::debug;

use super::OpContext;
use crate::messages::{ListEntry, NamespaceMessage, Operation};

/// Stream the listing requested by `deferred`.
///
/// On success the final payload is left in the request, ready for
/// [`DeferredReply::reply_in_place`]. Requests nobody waits for are not
/// executed at all.
pub fn execute(
    ctx: &OpContext,
    deferred: &mut DeferredReply<NamespaceMessage>,
    limit: usize,
    flush_interval: Duration,
) -> Result<()> {
    if !deferred.request().reply_required() {
        return Ok(());
    }

    let request = deferred.request().clone();
    let Operation::ListDirectory {
        pattern,
        range,
        requested,
        ..
    } = &request.op
    else {
        return Err(Status::invalid_arg("not a directory listing"));
    };
    let path = match (&request.path, request.id) {
        (Some(path), _) => path.clone(),
        (None, Some(id)) => ctx.provider.id_to_path(&request.subject, id)?,
        (None, None) => return Err(Status::invalid_arg("no id or path defined")),
    };
    ctx.check_mask_on_path(&request.subject, &path, &request.access_mask)?;

    let envelope = deferred.envelope();
    let delay = envelope
        .adjusted_ttl()
        .map_or(flush_interval, |ttl| ttl.min(flush_interval));
    let first = envelope
        .remaining()
        .map_or(flush_interval, |left| left.min(flush_interval));

    let limit = limit.max(1);
    let mut entries: Vec<ListEntry> = Vec::new();
    let mut sent: u32 = 0;
    let mut deadline = Instant::now() + first;

    let partial_source: &DeferredReply<NamespaceMessage> = deferred;
    let mut handler = |name: &str, attributes: FileAttributes| -> Result<()> {
        entries.push(ListEntry {
            name: name.to_string(),
            attributes,
        });
        if entries.len() >= limit || Instant::now() >= deadline {
            let mut partial = request.clone();
            if let Operation::ListDirectory { entries: chunk, .. } = &mut partial.op {
                *chunk = std::mem::take(&mut entries);
            }
            partial_source.send_partial(partial)?;
            sent += 1;
            deadline = Instant::now() + delay;
        }
        Ok(())
    };
    ctx.provider.list(
        &request.subject,
        &path,
        pattern.as_deref(),
        *range,
        requested,
        &mut handler,
    )?;

    debug!(%path, partials = sent, "listing complete");
    if let Operation::ListDirectory {
        entries: last,
        is_final,
        message_count,
        ..
    } = &mut deferred.request_mut().op
    {
        *last = entries;
        *is_final = true;
        *message_count = sent + 1;
    }
    Ok(())
}
