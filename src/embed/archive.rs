//! Serialization of the embedded archive: a gzip-compressed tar stream,
//! rendered as a C byte array for the wrapper.

use std::io;

use flate2::Compression;
use flate2::write::GzEncoder;
use itertools::Itertools;
use tar::{Builder, EntryType, Header};

/// Name of the C array holding the archive.
pub const ARRAY_NAME: &str = "tar_data";

const BYTES_PER_LINE: usize = 1024;

/// Writes `members` as a tar stream through gzip.
///
/// Headers are fixed apart from name and size, so identical inputs always
/// produce identical bytes.
pub fn write_archive<'a, I>(members: I) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::best()));
    for (name, data) in members {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder.append_data(&mut header, name, data)?;
    }
    builder.into_inner()?.finish()
}

/// Renders `bytes` as `static unsigned char tar_data[] = {...};`.
pub fn c_array(bytes: &[u8]) -> String {
    let mut source = format!("\nstatic unsigned char {ARRAY_NAME}[] = {{\n");
    for line in &bytes.iter().chunks(BYTES_PER_LINE) {
        source.push_str(&line.map(u8::to_string).join(","));
        source.push_str(",\n");
    }
    source.push_str("};\n");
    source
}
