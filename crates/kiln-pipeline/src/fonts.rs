//! TrueType/OpenType to WOFF2 conversion.
//!
//! Tables are stored untransformed (null transform for every table, including
//! `glyf` and `loca`) and compressed together as one brotli stream, which every
//! WOFF2 decoder accepts.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use tracing::info;

use crate::{
    output::{with_extension, write_output},
    sources::SourceSet,
    task::{IoContext, Result, Task, TaskContext, TaskError, TaskReport},
};

const WOFF2_SIGNATURE: u32 = 0x774F_4632; // "wOF2"
const WOFF2_HEADER_LEN: usize = 48;
const SFNT_HEADER_LEN: usize = 12;
const SFNT_ENTRY_LEN: usize = 16;

/// Tags with a one-byte encoding in the WOFF2 table directory.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

/// A table read from an sfnt file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SfntTable<'a> {
    tag: [u8; 4],
    data: &'a [u8],
}

/// Parsed sfnt container.
#[derive(Debug)]
struct Sfnt<'a> {
    flavor: u32,
    tables: Vec<SfntTable<'a>>,
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn parse_sfnt(data: &[u8]) -> std::result::Result<Sfnt<'_>, String> {
    let flavor = read_u32(data, 0).ok_or("file too short for an sfnt header")?;
    match flavor {
        0x0001_0000 | 0x4F54_544F /* OTTO */ | 0x7472_7565 /* true */ => {}
        0x7474_6366 /* ttcf */ => return Err("font collections are not supported".into()),
        other => return Err(format!("not a TrueType/OpenType font (signature {other:#010x})")),
    }

    let num_tables = read_u16(data, 4).ok_or("truncated sfnt header")? as usize;
    if num_tables == 0 {
        return Err("font has no tables".into());
    }

    let mut tables = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let entry = SFNT_HEADER_LEN + i * SFNT_ENTRY_LEN;
        let tag: [u8; 4] = data
            .get(entry..entry + 4)
            .and_then(|t| t.try_into().ok())
            .ok_or("truncated table directory")?;
        let offset = read_u32(data, entry + 8).ok_or("truncated table directory")? as usize;
        let length = read_u32(data, entry + 12).ok_or("truncated table directory")? as usize;
        let table = data.get(offset..offset + length).ok_or_else(|| {
            format!(
                "table '{}' points outside the file",
                String::from_utf8_lossy(&tag)
            )
        })?;
        tables.push(SfntTable { tag, data: table });
    }

    tables.sort_by(|a, b| a.tag.cmp(&b.tag));
    Ok(Sfnt { flavor, tables })
}

/// Encode `value` as a WOFF2 UIntBase128.
fn write_base128(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7F) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Convert an sfnt font to WOFF2.
pub fn sfnt_to_woff2(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let sfnt = parse_sfnt(data)?;

    let mut directory = Vec::new();
    let mut stream = Vec::new();
    let mut total_sfnt_size = SFNT_HEADER_LEN + SFNT_ENTRY_LEN * sfnt.tables.len();

    for table in &sfnt.tables {
        let known = KNOWN_TAGS.iter().position(|t| **t == table.tag);
        // glyf/loca use transform version 3 for "null"; every other table uses 0.
        let version: u8 = if matches!(&table.tag, b"glyf" | b"loca") { 3 } else { 0 };
        match known {
            Some(index) => directory.push((version << 6) | index as u8),
            None => {
                directory.push((version << 6) | 0x3F);
                directory.extend_from_slice(&table.tag);
            }
        }
        let length = u32::try_from(table.data.len()).map_err(|_| "table too large")?;
        write_base128(&mut directory, length);

        stream.extend_from_slice(table.data);
        total_sfnt_size += pad4(table.data.len());
    }

    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
    writer
        .write_all(&stream)
        .map_err(|e| format!("brotli compression failed: {e}"))?;
    let compressed = writer.into_inner();

    let total_len = pad4(WOFF2_HEADER_LEN + directory.len() + compressed.len());
    let num_tables = u16::try_from(sfnt.tables.len()).map_err(|_| "too many tables")?;
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&WOFF2_SIGNATURE.to_be_bytes());
    out.extend_from_slice(&sfnt.flavor.to_be_bytes());
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // reserved
    out.extend_from_slice(&(total_sfnt_size as u32).to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // majorVersion
    out.extend_from_slice(&0u16.to_be_bytes()); // minorVersion
    out.extend_from_slice(&[0u8; 20]); // metadata and private blocks: none
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    out.resize(total_len, 0);

    Ok(out)
}

/// The `fonts` task.
#[derive(Debug)]
pub struct FontsTask {
    sources: SourceSet,
    dest: PathBuf,
}

impl FontsTask {
    /// Convert `fonts/*.ttf` under `src_root` into `build_root/fonts`.
    #[must_use]
    pub fn new(src_root: impl Into<PathBuf>, build_root: &Path) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["fonts/*.{ttf,otf}"]),
            dest: build_root.join("fonts"),
        }
    }
}

impl Task for FontsTask {
    fn name(&self) -> &'static str {
        "fonts"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dest.clone()]
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let files = self.sources.files();

        let written = files
            .par_iter()
            .map(|source| {
                let data = fs::read(source).at(source)?;
                let woff2 =
                    sfnt_to_woff2(&data).map_err(|message| TaskError::transform(source, message))?;
                let name = source.file_name().map(Path::new).unwrap_or(source.as_path());
                let dest = self.dest.join(with_extension(name, "woff2"));
                write_output(&dest, woff2)?;
                Ok(dest)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(count = written.len(), "fonts converted");
        Ok(TaskReport {
            written,
            ..TaskReport::default()
        })
    }
}
