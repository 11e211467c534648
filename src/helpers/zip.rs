//! ZIP archive helper utilities for the xlsx package.
//! Reads every entry into memory and writes entries back in their original order.

use crate::error::ContainerError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlReader;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::DateTime;
use zip::ZipArchive;
use zip::ZipWriter;

/// One entry of the package, held in memory
#[derive(Clone, Debug)]
pub(crate) struct Part {
    /// Entry name inside the archive, e.g. `xl/worksheets/sheet1.xml`
    pub(crate) name: String,
    /// Raw (uncompressed) bytes of the entry
    pub(crate) data: Vec<u8>,
    /// Directory entries carry no data
    pub(crate) is_dir: bool,
    compression: CompressionMethod,
    modified: Option<DateTime>,
}

impl Part {
    /// Creates a new deflated part
    pub(crate) fn new(name: &str, data: Vec<u8>) -> Part {
        Part {
            name: name.to_owned(),
            data,
            is_dir: false,
            compression: CompressionMethod::Deflated,
            modified: None,
        }
    }

    /// Creates an XML reader over the part content
    pub(crate) fn xml_reader(&self) -> XmlReader<&[u8]> {
        XmlReader::new(self.data.as_slice())
    }

    fn options(&self) -> SimpleFileOptions {
        // Only stored and deflated are available for writing
        let method = match self.compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default().compression_method(method);
        match self.modified {
            Some(time) => options.last_modified_time(time),
            None => options,
        }
    }
}

/// Helper trait for ZIP archive operations
pub(crate) trait ZipHelper {
    /// Reads every entry of the archive in central directory order
    fn read_parts(&mut self) -> Result<Vec<Part>, ContainerError>;
}

impl<RS: Read + Seek> ZipHelper for ZipArchive<RS> {
    fn read_parts(&mut self) -> Result<Vec<Part>, ContainerError> {
        let mut parts = Vec::with_capacity(self.len());
        for index in 0..self.len() {
            let mut file = self.by_index(index)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            let name = file.name().to_owned();
            file.read_to_end(&mut data)
                .map_err(ContainerError::from)
                .with_prefix(&name)?;
            parts.push(Part {
                is_dir: file.is_dir(),
                compression: file.compression(),
                modified: file.last_modified(),
                name,
                data,
            });
        }
        Ok(parts)
    }
}

/// Finds a part by name (case-insensitive, path separator agnostic)
pub(crate) fn find_part(parts: &[Part], name: &str) -> Option<usize> {
    let pattern = name.replace('\\', "/");
    let pattern = pattern.trim_start_matches('/');
    parts
        .iter()
        .position(|part| pattern.eq_ignore_ascii_case(&part.name.replace('\\', "/")))
}

/// Writes parts into a new archive, keeping their order
///
/// # Arguments
/// * `writer` - Destination of the archive
/// * `parts` - Entries to write
///
/// # Returns
/// The writer handed back once the central directory is written
pub(crate) fn write_parts<W: Write + Seek>(writer: W, parts: &[Part]) -> Result<W, ContainerError> {
    let mut zip = ZipWriter::new(writer);
    for part in parts {
        if part.is_dir {
            zip.add_directory(part.name.as_str(), part.options())?;
        } else {
            zip.start_file(part.name.as_str(), part.options())?;
            zip.write_all(&part.data)?;
        }
    }
    Ok(zip.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parts_keep_order_and_content() {
        let parts = vec![
            Part::new("[Content_Types].xml", b"<Types/>".to_vec()),
            Part::new("xl/workbook.xml", b"<workbook/>".to_vec()),
        ];
        let bytes = write_parts(Cursor::new(Vec::new()), &parts).unwrap().into_inner();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let read = archive.read_parts().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].name, "[Content_Types].xml");
        assert_eq!(read[1].data, b"<workbook/>");
    }

    #[test]
    fn find_part_ignores_case_and_separators() {
        let parts = vec![Part::new("xl/worksheets/Sheet1.xml", Vec::new())];
        assert_eq!(find_part(&parts, "/xl\\worksheets\\sheet1.xml"), Some(0));
        assert_eq!(find_part(&parts, "xl/worksheets/sheet2.xml"), None);
    }
}
