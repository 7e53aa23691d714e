//! All-to-all payload exchange for one round.
//!
//! Stage 1 exchanges payload lengths with every peer (zero included, since a
//! receiver cannot otherwise know who will write to it). Stage 2 moves only
//! the non-empty payloads. Both stages drain every handle they posted before
//! reporting the first error.

use std::mem::size_of;

use bytes::Bytes;

use crate::bsp_error::BspError;
use crate::comm::communicator::{CommTag, Communicator, RoundTags, Wait};
use crate::comm::wire::{WireLen, cast_slice, cast_slice_mut, read_pod};

/// Stage 1: lengths of the payloads every peer will send to this rank.
pub fn exchange_sizes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &[Bytes],
) -> Result<Vec<usize>, BspError> {
    let (me, size) = (comm.rank(), comm.size());

    // 1) post all receives
    let mut recvs = Vec::with_capacity(size);
    for peer in (0..size).filter(|&p| p != me) {
        let mut len = WireLen::new(0);
        let h = comm.irecv(peer, tag.as_u16(), cast_slice_mut(std::slice::from_mut(&mut len)));
        recvs.push((peer, h));
    }

    // 2) post all sends
    let mut pending_sends = Vec::with_capacity(size);
    for peer in (0..size).filter(|&p| p != me) {
        let n = outgoing.get(peer).map_or(0, Bytes::len);
        let len = WireLen::new(n);
        pending_sends.push(comm.isend(peer, tag.as_u16(), cast_slice(std::slice::from_ref(&len))));
    }

    // 3) wait for all recvs, but do not early-return
    let mut sizes_in = vec![0usize; size];
    let mut maybe_err = None;
    for (peer, h) in recvs {
        match h.wait() {
            Some(data) if data.len() == size_of::<WireLen>() => {
                if maybe_err.is_none() {
                    match read_pod::<WireLen>(&data) {
                        Ok(len) => sizes_in[peer] = len.get(),
                        Err(e) => maybe_err = Some(e),
                    }
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(BspError::CommError {
                    neighbor: peer,
                    message: format!(
                        "expected {} bytes for size header, got {}",
                        size_of::<WireLen>(),
                        data.len()
                    ),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(BspError::CommError {
                    neighbor: peer,
                    message: format!("failed to receive size from rank {peer}"),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}

/// Stage 2: move the non-empty payloads. `sizes_in` comes from [`exchange_sizes`].
pub fn exchange_data<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &[Bytes],
    sizes_in: &[usize],
) -> Result<Vec<Bytes>, BspError> {
    let (me, size) = (comm.rank(), comm.size());

    let mut recvs = Vec::new();
    for peer in (0..size).filter(|&p| p != me) {
        let expected = sizes_in.get(peer).copied().unwrap_or(0);
        if expected == 0 {
            continue;
        }
        let mut buf = vec![0u8; expected];
        let h = comm.irecv(peer, tag.as_u16(), &mut buf);
        recvs.push((peer, expected, h));
    }

    let mut pending_sends = Vec::new();
    for peer in (0..size).filter(|&p| p != me) {
        match outgoing.get(peer) {
            Some(payload) if !payload.is_empty() => {
                pending_sends.push(comm.isend(peer, tag.as_u16(), payload));
            }
            _ => {}
        }
    }

    let mut incoming = vec![Bytes::new(); size];
    let mut maybe_err = None;
    for (peer, expected, h) in recvs {
        match h.wait() {
            Some(data) if data.len() == expected => {
                if maybe_err.is_none() {
                    incoming[peer] = Bytes::from(data);
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(BspError::CommError {
                    neighbor: peer,
                    message: format!("expected {expected} payload bytes, got {}", data.len()),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(BspError::CommError {
                    neighbor: peer,
                    message: format!("failed to receive payload from rank {peer}"),
                });
            }
            _ => {}
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(incoming),
    }
}

/// Send `outgoing[peer]` to every peer and return what each peer sent here,
/// indexed by rank. The entry for this rank is always empty.
pub fn exchange_payloads<C: Communicator>(
    comm: &C,
    tags: &RoundTags,
    outgoing: &[Bytes],
) -> Result<Vec<Bytes>, BspError> {
    if comm.size() <= 1 {
        return Ok(vec![Bytes::new(); comm.size().max(1)]);
    }
    let sizes_in = exchange_sizes(comm, tags.sizes, outgoing)?;
    exchange_data(comm, tags.data, outgoing, &sizes_in)
}
