//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use flate2::bufread::MultiGzDecoder;

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path).map(BufReader::new)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, Write};

    use pretty_assertions::assert_eq;

    #[test]
    fn open_read_maybe_gz_plain() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("lines.txt");
        std::fs::write(&path, "first\nsecond\n")?;

        let lines = super::open_read_maybe_gz(&path)?
            .lines()
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(vec!["first".to_string(), "second".to_string()], lines);

        Ok(())
    }

    #[test]
    fn open_read_maybe_gz_gzip() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("lines.txt.gz");

        {
            let file = std::fs::File::create(&path)?;
            let mut encoder =
                flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"first\nsecond\n")?;
            encoder.finish()?;
        }

        let lines = super::open_read_maybe_gz(&path)?
            .lines()
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(vec!["first".to_string(), "second".to_string()], lines);

        Ok(())
    }
}
