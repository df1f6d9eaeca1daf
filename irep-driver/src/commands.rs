// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Implementation of the driver subcommands. Each one writes its result to the
//! given output so it can be tested without touching stdout.

use crate::util::{self, InputFormat};
use anyhow::{Context, Result, bail};
use irep_bindings::irep::binary_serde::{
    DecodedIreps, read_irep_slice, write_irep_file, write_irep_vec,
};
use irep_bindings::irep::esbmc_binary::EsbmcBinaryReader;
use irep_bindings::irep::serialize::IrepJson;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Reads a native or ESBMC file, whichever the first bytes say it is.
pub fn read_input(input: &Path) -> Result<DecodedIreps> {
    let bytes =
        std::fs::read(input).with_context(|| format!("failed to read `{}`", input.display()))?;
    let format = InputFormat::detect(&bytes);
    debug!(?input, ?format, len = bytes.len(), "read_input");
    let decoded = match format {
        Some(InputFormat::Native) => read_irep_slice(&bytes),
        Some(InputFormat::Esbmc) => EsbmcBinaryReader::new(&bytes).and_then(|r| r.read_all()),
        None => bail!("`{}` is neither a native nor an ESBMC irep file", input.display()),
    };
    decoded.with_context(|| format!("failed to decode `{}`", input.display()))
}

/// Size figures of a decoded file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats {
    pub nodes: usize,
    pub strings: usize,
    pub roots: usize,
    /// Distinct nodes reachable from the roots.
    pub reachable: usize,
    /// Number of nodes the roots would have as trees, with every shared node copied.
    pub expanded: u64,
}

impl Stats {
    pub fn compute(decoded: &DecodedIreps) -> Result<Stats> {
        let container = &decoded.container;
        let reachable = container.reachable_from(&decoded.roots)?;
        // Post-order, so every child size is known before its parent's.
        let mut sizes = vec![0u64; container.len()];
        for &index in &reachable {
            let node = container.node(index).context("reachable node is missing")?;
            sizes[index.index()] = node
                .children()
                .iter()
                .fold(1u64, |size, child| size.saturating_add(sizes[child.node.index()]));
        }
        let expanded =
            decoded.roots.iter().fold(0u64, |total, root| total.saturating_add(sizes[root.index()]));
        Ok(Stats {
            nodes: container.len(),
            strings: container.strings().len(),
            roots: decoded.roots.len(),
            reachable: reachable.len(),
            expanded,
        })
    }

    /// How many tree nodes each stored node stands for.
    pub fn sharing(&self) -> f64 {
        if self.reachable == 0 { 1.0 } else { self.expanded as f64 / self.reachable as f64 }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes:     {}", self.nodes)?;
        writeln!(f, "strings:   {}", self.strings)?;
        writeln!(f, "roots:     {}", self.roots)?;
        writeln!(f, "reachable: {}", self.reachable)?;
        writeln!(f, "expanded:  {}", self.expanded)?;
        writeln!(f, "sharing:   {:.2}", self.sharing())
    }
}

pub fn run_stats(input: &Path, out: &mut impl Write) -> Result<()> {
    let decoded = read_input(input)?;
    let stats = Stats::compute(&decoded)?;
    write!(out, "{stats}")?;
    Ok(())
}

pub fn run_dump(input: &Path, root: Option<usize>, out: &mut impl Write) -> Result<()> {
    let decoded = read_input(input)?;
    match root {
        Some(position) => {
            let Some(&index) = decoded.roots.get(position) else {
                bail!("root {position} is out of range, the file has {} roots", decoded.roots.len())
            };
            serde_json::to_writer_pretty(&mut *out, &IrepJson {
                container: &decoded.container,
                index,
            })?;
        }
        None => serde_json::to_writer_pretty(&mut *out, &decoded)?,
    }
    writeln!(out)?;
    Ok(())
}

pub fn run_convert(input: &Path, output: &Path) -> Result<()> {
    let bytes =
        std::fs::read(input).with_context(|| format!("failed to read `{}`", input.display()))?;
    if InputFormat::detect(&bytes) != Some(InputFormat::Esbmc) {
        bail!("`{}` is not an ESBMC irep file", input.display());
    }
    let decoded = EsbmcBinaryReader::new(&bytes)
        .and_then(|reader| reader.read_all())
        .with_context(|| format!("failed to decode `{}`", input.display()))?;
    write_irep_file(output, &decoded.container, &decoded.roots)
        .with_context(|| format!("failed to write `{}`", output.display()))?;
    util::info_operation(
        "Converted",
        &format!("{} ireps to `{}`", decoded.container.len(), output.display()),
    );
    Ok(())
}

pub fn run_check(input: &Path) -> Result<()> {
    let decoded = read_input(input)?;
    let bytes = write_irep_vec(&decoded.container, &decoded.roots)?;
    let again = read_irep_slice(&bytes).context("failed to read back the written ireps")?;
    if !decoded.container.isomorphic_to(&decoded.roots, &again.container, &again.roots) {
        bail!("`{}` does not survive a write and read round trip", input.display());
    }
    util::info_operation("Checked", &format!("`{}` ({} bytes written)", input.display(), bytes.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use irep_bindings::irep::{Irep, IrepContainer};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// `x + x` with its type, written in the native format.
    fn native_file(dir: &TempDir) -> PathBuf {
        let mut container = IrepContainer::with_capacity(3).unwrap();
        let x = container.intern("x").unwrap();
        let plus = container.intern("+").unwrap();
        let ty = container.intern("type").unwrap();
        let int = container.intern("signedbv").unwrap();
        let leaf = container.insert(Irep::just_id(x)).unwrap();
        let int = container.insert(Irep::just_id(int)).unwrap();
        let root =
            container.insert(Irep::just_sub(plus, [leaf, leaf]).with_named_sub(ty, int)).unwrap();
        let path = dir.path().join("plus.irep");
        write_irep_file(&path, &container, &[root]).unwrap();
        path
    }

    /// The same expression as an ESBMC stream.
    fn esbmc_file(dir: &TempDir) -> PathBuf {
        fn word(bytes: &mut Vec<u8>, w: u32) {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        let mut bytes = b"GBF".to_vec();
        word(&mut bytes, 1);
        word(&mut bytes, 0);
        word(&mut bytes, 0);
        bytes.extend_from_slice(b"+\0S");
        word(&mut bytes, 1);
        word(&mut bytes, 1);
        bytes.extend_from_slice(b"x\0\0S");
        word(&mut bytes, 1);
        bytes.push(b'N');
        word(&mut bytes, 2);
        bytes.extend_from_slice(b"type\0");
        word(&mut bytes, 2);
        word(&mut bytes, 3);
        bytes.extend_from_slice(b"signedbv\0\0\0");
        let path = dir.path().join("plus.gbf");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn check_stats() {
        let dir = TempDir::new().unwrap();
        let decoded = read_input(&native_file(&dir)).unwrap();
        let stats = Stats::compute(&decoded).unwrap();
        assert_eq!(stats, Stats { nodes: 3, strings: 4, roots: 1, reachable: 3, expanded: 4 });
        assert!((stats.sharing() - 4.0 / 3.0).abs() < 1e-9);

        let mut out = Vec::new();
        run_stats(&native_file(&dir), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("expanded:  4"));
        assert!(text.contains("sharing:   1.33"));
    }

    #[test]
    fn check_dump_root() {
        let dir = TempDir::new().unwrap();
        let input = native_file(&dir);
        let mut out = Vec::new();
        run_dump(&input, Some(0), &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["id"], "+");
        assert_eq!(json["sub"][1]["id"], "x");
        assert_eq!(json["namedSub"]["type"]["id"], "signedbv");

        let err = run_dump(&input, Some(1), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn check_dump_all() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        run_dump(&esbmc_file(&dir), None, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["roots"].as_array().unwrap().len(), 1);
        assert_eq!(json["roots"][0]["sub"][0]["id"], "x");
    }

    #[test]
    fn check_convert() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("converted.irep");
        run_convert(&esbmc_file(&dir), &output).unwrap();

        let converted = read_input(&output).unwrap();
        let native = read_input(&native_file(&dir)).unwrap();
        assert!(converted.container.isomorphic_to(
            &converted.roots,
            &native.container,
            &native.roots
        ));
    }

    #[test]
    fn check_convert_rejects_native_input() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.irep");
        let err = run_convert(&native_file(&dir), &output).unwrap_err();
        assert!(err.to_string().contains("not an ESBMC irep file"));
    }

    #[test]
    fn check_round_trip() {
        let dir = TempDir::new().unwrap();
        run_check(&native_file(&dir)).unwrap();
        run_check(&esbmc_file(&dir)).unwrap();
    }

    #[test]
    fn check_unknown_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, b"junk").unwrap();
        let err = read_input(&path).unwrap_err();
        assert!(err.to_string().contains("neither a native nor an ESBMC"));
    }

    #[test]
    fn check_truncated_input() {
        let dir = TempDir::new().unwrap();
        let input = native_file(&dir);
        let bytes = std::fs::read(&input).unwrap();
        std::fs::write(&input, &bytes[..bytes.len() - 3]).unwrap();
        let err = read_input(&input).unwrap_err();
        assert!(format!("{err:#}").contains("malformed irep stream"));
    }

    #[test]
    fn check_repeated_esbmc_root() {
        fn word(bytes: &mut Vec<u8>, w: u32) {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("nil.gbf");
        let mut bytes = b"GBF".to_vec();
        word(&mut bytes, 1);
        word(&mut bytes, 7);
        word(&mut bytes, 0);
        bytes.extend_from_slice(b"nil\0\0");
        word(&mut bytes, 7);
        std::fs::write(&input, bytes).unwrap();

        run_check(&input).unwrap();
        let output = dir.path().join("nil.irep");
        run_convert(&input, &output).unwrap();
        let converted = read_input(&output).unwrap();
        assert_eq!(converted.roots.len(), 2);
        assert_eq!(converted.roots[0], converted.roots[1]);
        assert_eq!(converted.container.len(), 1);
    }

    #[test]
    fn check_dump_deep_chain() {
        let depth = 200_000;
        let mut container = IrepContainer::with_capacity(depth).unwrap();
        let neg = container.intern("unary-").unwrap();
        let mut node = container.insert(Irep::just_id(neg)).unwrap();
        for _ in 1..depth {
            node = container.insert(Irep::just_sub(neg, [node])).unwrap();
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.irep");
        write_irep_file(&path, &container, &[node]).unwrap();

        run_check(&path).unwrap();
        run_stats(&path, &mut Vec::new()).unwrap();
        let err = run_dump(&path, None, &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("irep nesting too deep"));
    }
}
