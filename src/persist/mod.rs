//! Persistence of the pair statistics.
//!
//! The matrix file starts with the magic `PTRARR1`, the dimension
//! `D`, and a fingerprint of the codebook, followed by the row-major
//! relative-risk and p-value matrices as big-endian IEEE754 doubles.
//! Infinite relative risks round-trip as IEEE754 infinities. A
//! sidecar file (`<path>.patients`) carries, per pair, the sorted
//! supporting patient ids as delta-encoded varints. Loading verifies
//! dimension and fingerprint against the resuming run and fails with
//! an incompatibility error on any mismatch.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use crate::algorithm::pairs::PairMatrix;
use crate::error::{Result, ResultExt, TrajanError};
use crate::models::Pid;

const MATRIX_MAGIC: &[u8; 7] = b"PTRARR1";
const SUPPORT_MAGIC: &[u8; 7] = b"PTRAPS1";

/// Path of the support sidecar belonging to a matrix file.
#[must_use]
pub fn support_sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".patients");
    PathBuf::from(name)
}

/// Write the pair statistics and their support sidecar.
///
/// # Errors
/// Fails on I/O errors; paths are attached as context.
pub fn save_rr(path: &Path, pairs: &PairMatrix, fingerprint: [u8; 8]) -> Result<()> {
    let d = pairs.dimension();
    let mut out = BufWriter::new(
        File::create(path).with_path_context("cannot create RR matrix file", path)?,
    );
    out.write_all(MATRIX_MAGIC)
        .with_path_context("cannot write RR matrix header", path)?;
    out.write_u32::<BigEndian>(d as u32)
        .with_path_context("cannot write RR matrix header", path)?;
    out.write_all(&fingerprint)
        .with_path_context("cannot write RR matrix header", path)?;
    for &value in pairs.rr_values() {
        out.write_f64::<BigEndian>(value)
            .with_path_context("cannot write RR values", path)?;
    }
    for &value in pairs.p_values() {
        out.write_f64::<BigEndian>(value)
            .with_path_context("cannot write p-values", path)?;
    }
    out.flush().with_path_context("cannot flush RR matrix", path)?;

    let sidecar = support_sidecar_path(path);
    let mut out = BufWriter::new(
        File::create(&sidecar).with_path_context("cannot create support sidecar", &sidecar)?,
    );
    out.write_all(SUPPORT_MAGIC)
        .with_path_context("cannot write support header", &sidecar)?;
    out.write_u32::<BigEndian>(d as u32)
        .with_path_context("cannot write support header", &sidecar)?;
    out.write_all(&fingerprint)
        .with_path_context("cannot write support header", &sidecar)?;
    for support in pairs.support_sets() {
        write_varint(&mut out, support.len() as u64)
            .with_path_context("cannot write support set", &sidecar)?;
        let mut prev: Pid = 0;
        for (i, &pid) in support.iter().enumerate() {
            let delta = if i == 0 { u64::from(pid) } else { u64::from(pid - prev) };
            write_varint(&mut out, delta)
                .with_path_context("cannot write support set", &sidecar)?;
            prev = pid;
        }
    }
    out.flush()
        .with_path_context("cannot flush support sidecar", &sidecar)?;

    info!(
        "Saved RR matrix (D = {d}) to {} with support sidecar",
        path.display()
    );
    Ok(())
}

/// Read pair statistics written by [`save_rr`].
///
/// # Errors
/// Fails with [`TrajanError::IncompatibleRrFile`] when the magic,
/// dimension, or codebook fingerprint do not match the current run.
pub fn load_rr(path: &Path, d: usize, fingerprint: [u8; 8]) -> Result<PairMatrix> {
    let mut input = BufReader::new(
        File::open(path).with_path_context("cannot open RR matrix file", path)?,
    );
    read_header(&mut input, MATRIX_MAGIC, d, fingerprint, path)?;

    let cells = d * d;
    let mut rr = vec![0.0f64; cells];
    for value in &mut rr {
        *value = input
            .read_f64::<BigEndian>()
            .with_path_context("truncated RR values", path)?;
    }
    let mut p_value = vec![0.0f64; cells];
    for value in &mut p_value {
        *value = input
            .read_f64::<BigEndian>()
            .with_path_context("truncated p-values", path)?;
    }

    let sidecar = support_sidecar_path(path);
    let mut input = BufReader::new(
        File::open(&sidecar).with_path_context("cannot open support sidecar", &sidecar)?,
    );
    read_header(&mut input, SUPPORT_MAGIC, d, fingerprint, &sidecar)?;

    let mut support: Vec<Vec<Pid>> = Vec::with_capacity(cells);
    for _ in 0..cells {
        let count = read_varint(&mut input)
            .with_path_context("truncated support set", &sidecar)?;
        let mut pids = Vec::with_capacity(count as usize);
        let mut prev: u64 = 0;
        for i in 0..count {
            let delta = read_varint(&mut input)
                .with_path_context("truncated support set", &sidecar)?;
            let pid = if i == 0 { delta } else { prev + delta };
            pids.push(pid as Pid);
            prev = pid;
        }
        support.push(pids);
    }

    info!("Loaded RR matrix (D = {d}) from {}", path.display());
    Ok(PairMatrix::from_parts(d, rr, p_value, support))
}

fn read_header<R: Read>(
    input: &mut R,
    magic: &[u8; 7],
    d: usize,
    fingerprint: [u8; 8],
    path: &Path,
) -> Result<()> {
    let mut found_magic = [0u8; 7];
    input
        .read_exact(&mut found_magic)
        .with_path_context("cannot read header", path)?;
    if &found_magic != magic {
        return Err(TrajanError::IncompatibleRrFile(format!(
            "bad magic in {}",
            path.display()
        ))
        .into());
    }
    let found_d = input
        .read_u32::<BigEndian>()
        .with_path_context("cannot read header", path)?;
    if found_d as usize != d {
        return Err(TrajanError::IncompatibleRrFile(format!(
            "dimension mismatch: file has D = {found_d}, current run has D = {d}"
        ))
        .into());
    }
    let mut found_fingerprint = [0u8; 8];
    input
        .read_exact(&mut found_fingerprint)
        .with_path_context("cannot read header", path)?;
    if found_fingerprint != fingerprint {
        return Err(TrajanError::IncompatibleRrFile(
            "codebook fingerprint mismatch; the file was written for a different code mapping"
                .to_string(),
        )
        .into());
    }
    Ok(())
}

fn write_varint<W: Write>(out: &mut W, mut value: u64) -> std::io::Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.write_all(&[byte])?;
        if value == 0 {
            return Ok(());
        }
    }
}

fn read_varint<R: Read>(input: &mut R) -> std::io::Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        input.read_exact(&mut byte)?;
        value |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "varint overflow",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> PairMatrix {
        let mut pairs = PairMatrix::new(3);
        pairs.set_rr(0, 1, 2.5);
        pairs.set_rr(0, 2, f64::INFINITY);
        pairs.set_p_value(0, 1, 0.0);
        pairs.set_p_value(0, 2, 0.025);
        pairs.set_support(0, 1, vec![0, 3, 17, 1000]);
        pairs.set_support(0, 2, vec![5]);
        pairs
    }

    #[test]
    fn round_trip_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rr");
        let pairs = sample_matrix();
        let fingerprint = [1, 2, 3, 4, 5, 6, 7, 8];

        save_rr(&path, &pairs, fingerprint).unwrap();
        let loaded = load_rr(&path, 3, fingerprint).unwrap();

        assert_eq!(loaded.rr_values(), pairs.rr_values());
        assert_eq!(loaded.p_values(), pairs.p_values());
        for a in 0..3 {
            for b in 0..3 {
                assert_eq!(loaded.support(a, b), pairs.support(a, b));
            }
        }
        assert!(loaded.rr(0, 2).is_infinite());
    }

    #[test]
    fn fingerprint_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rr");
        save_rr(&path, &sample_matrix(), [0; 8]).unwrap();

        let error = load_rr(&path, 3, [9; 8]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<TrajanError>(),
            Some(TrajanError::IncompatibleRrFile(_))
        ));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.rr");
        save_rr(&path, &sample_matrix(), [0; 8]).unwrap();

        let error = load_rr(&path, 4, [0; 8]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<TrajanError>(),
            Some(TrajanError::IncompatibleRrFile(_))
        ));
    }

    #[test]
    fn varints_round_trip() {
        let values = [0u64, 1, 127, 128, 300, u64::from(u32::MAX), u64::MAX];
        let mut buffer = Vec::new();
        for &value in &values {
            write_varint(&mut buffer, value).unwrap();
        }
        let mut cursor = std::io::Cursor::new(buffer);
        for &value in &values {
            assert_eq!(read_varint(&mut cursor).unwrap(), value);
        }
    }
}
