use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::errors::MatrixError;
use crate::region_matrix::RegionMatrix;

impl RegionMatrix {
    ///
    /// Write the window as tab-delimited text with region-name row and
    /// column headers. A `.gz` extension selects gzip compression. Masked
    /// cells are written as `nan`.
    ///
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<(), MatrixError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let mut writer: Box<dyn Write> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };

        for col_region in self.col_regions() {
            write!(writer, "\t{}", col_region)?;
        }
        writeln!(writer)?;

        let (rows, cols) = self.shape();
        for i in 0..rows {
            write!(writer, "{}", self.row_regions()[i])?;
            for j in 0..cols {
                if self.is_masked(i, j) {
                    write!(writer, "\tnan")?;
                } else {
                    write!(writer, "\t{:.6e}", self.get(i, j))?;
                }
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}
