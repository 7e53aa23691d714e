//! Collectives built from point-to-point messages.
//!
//! Every rank must call the same collectives in the same order with the same
//! tags. Values are gathered on rank 0 in rank order, reduced there, and the
//! result is broadcast back, so floating-point reductions are deterministic.

use std::mem::size_of;

use bytemuck::Pod;

use crate::bsp_error::BspError;
use crate::comm::communicator::{Communicator, RoundTags, Wait};
use crate::comm::wire::{cast_slice, cast_slice_mut};

fn decode_exact<T: Pod>(peer: usize, data: Option<Vec<u8>>, n: usize) -> Result<Vec<T>, BspError> {
    match data {
        Some(bytes) if bytes.len() == n * size_of::<T>() => Ok((0..n)
            .map(|i| bytemuck::pod_read_unaligned(&bytes[i * size_of::<T>()..(i + 1) * size_of::<T>()]))
            .collect()),
        Some(bytes) => Err(BspError::CommError {
            neighbor: peer,
            message: format!(
                "expected {} bytes for collective, got {}",
                n * size_of::<T>(),
                bytes.len()
            ),
        }),
        None => Err(BspError::CommError {
            neighbor: peer,
            message: format!("failed to receive collective from rank {peer}"),
        }),
    }
}

/// Every rank's `value`, indexed by rank.
pub fn all_gather<C, T>(comm: &C, tags: &RoundTags, value: T) -> Result<Vec<T>, BspError>
where
    C: Communicator,
    T: Pod,
{
    let size = comm.size();
    if size <= 1 {
        return Ok(vec![value]);
    }
    if comm.rank() == 0 {
        // 1) gather from every other rank
        let mut recvs = Vec::with_capacity(size - 1);
        for peer in 1..size {
            let mut buf = T::zeroed();
            let h = comm.irecv(peer, tags.gather.as_u16(), cast_slice_mut(std::slice::from_mut(&mut buf)));
            recvs.push((peer, h));
        }
        let mut all = Vec::with_capacity(size);
        all.push(value);
        let mut maybe_err = None;
        for (peer, h) in recvs {
            match decode_exact::<T>(peer, h.wait(), 1) {
                Ok(v) if maybe_err.is_none() => all.extend(v),
                Err(e) if maybe_err.is_none() => maybe_err = Some(e),
                _ => {} // already failed; just drain
            }
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }
        // 2) broadcast the full vector
        let sends: Vec<_> = (1..size)
            .map(|peer| comm.isend(peer, tags.bcast.as_u16(), cast_slice(&all)))
            .collect();
        for s in sends {
            let _ = s.wait();
        }
        Ok(all)
    } else {
        let send = comm.isend(0, tags.gather.as_u16(), cast_slice(std::slice::from_ref(&value)));
        let mut buf = vec![T::zeroed(); size];
        let h = comm.irecv(0, tags.bcast.as_u16(), cast_slice_mut(&mut buf));
        let res = decode_exact::<T>(0, h.wait(), size);
        let _ = send.wait();
        res
    }
}

/// Fold every rank's `value` with `op` (in rank order) and return the result on all ranks.
pub fn all_reduce<C, T, F>(comm: &C, tags: &RoundTags, value: T, op: F) -> Result<T, BspError>
where
    C: Communicator,
    T: Pod,
    F: Fn(T, T) -> T,
{
    let size = comm.size();
    if size <= 1 {
        return Ok(value);
    }
    if comm.rank() == 0 {
        let mut recvs = Vec::with_capacity(size - 1);
        for peer in 1..size {
            let mut buf = T::zeroed();
            let h = comm.irecv(peer, tags.gather.as_u16(), cast_slice_mut(std::slice::from_mut(&mut buf)));
            recvs.push((peer, h));
        }
        let mut acc = value;
        let mut maybe_err = None;
        for (peer, h) in recvs {
            match decode_exact::<T>(peer, h.wait(), 1) {
                Ok(v) if maybe_err.is_none() => acc = op(acc, v[0]),
                Err(e) if maybe_err.is_none() => maybe_err = Some(e),
                _ => {}
            }
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }
        let sends: Vec<_> = (1..size)
            .map(|peer| comm.isend(peer, tags.bcast.as_u16(), cast_slice(std::slice::from_ref(&acc))))
            .collect();
        for s in sends {
            let _ = s.wait();
        }
        Ok(acc)
    } else {
        let send = comm.isend(0, tags.gather.as_u16(), cast_slice(std::slice::from_ref(&value)));
        let mut buf = T::zeroed();
        let h = comm.irecv(0, tags.bcast.as_u16(), cast_slice_mut(std::slice::from_mut(&mut buf)));
        let res = decode_exact::<T>(0, h.wait(), 1).map(|v| v[0]);
        let _ = send.wait();
        res
    }
}

pub fn all_reduce_sum<C, T>(comm: &C, tags: &RoundTags, value: T) -> Result<T, BspError>
where
    C: Communicator,
    T: Pod + std::ops::Add<Output = T>,
{
    all_reduce(comm, tags, value, |a, b| a + b)
}

pub fn all_reduce_min<C, T>(comm: &C, tags: &RoundTags, value: T) -> Result<T, BspError>
where
    C: Communicator,
    T: Pod + PartialOrd,
{
    all_reduce(comm, tags, value, |a, b| if b < a { b } else { a })
}

pub fn all_reduce_max<C, T>(comm: &C, tags: &RoundTags, value: T) -> Result<T, BspError>
where
    C: Communicator,
    T: Pod + PartialOrd,
{
    all_reduce(comm, tags, value, |a, b| if b > a { b } else { a })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::{LocalComm, NoComm};
    use std::thread;

    #[test]
    fn single_rank_is_identity() {
        let tags = RoundTags::default();
        assert_eq!(all_reduce_sum(&NoComm, &tags, 7u64).unwrap(), 7);
        assert_eq!(all_gather(&NoComm, &tags, 3u32).unwrap(), vec![3]);
    }

    #[test]
    fn reductions_agree_on_every_rank() {
        let tags = RoundTags::default();
        let handles: Vec<_> = LocalComm::group(4)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let r = comm.rank() as i64;
                    let sum = all_reduce_sum(&comm, &tags, r).unwrap();
                    let min = all_reduce_min(&comm, &tags, 10 - r).unwrap();
                    let max = all_reduce_max(&comm, &tags, r * r).unwrap();
                    let all = all_gather(&comm, &tags, r as u32).unwrap();
                    (sum, min, max, all)
                })
            })
            .collect();
        for h in handles {
            let (sum, min, max, all) = h.join().unwrap();
            assert_eq!((sum, min, max), (6, 7, 9));
            assert_eq!(all, vec![0, 1, 2, 3]);
        }
    }
}
