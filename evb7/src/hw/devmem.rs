// Physical register window through /dev/mem, one positioned access per word.
use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::fpga::RegisterMap;
use crate::Result;

pub struct DevMem {
    file: File,
    base: u64,
    size: u64,
}

impl DevMem {
    pub fn open<P: AsRef<Path>>(path: P, base: u64, size: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        log::debug!("mapped {:#x}..{:#x}", base, base + size);
        Ok(Self { file, base, size })
    }

    fn position(&self, offset: u32) -> std::io::Result<u64> {
        let offset = u64::from(offset);
        if offset % 4 != 0 || offset + 4 > self.size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("offset {:#x} outside {:#x} byte window", offset, self.size),
            ));
        }
        Ok(self.base + offset)
    }
}

impl RegisterMap for DevMem {
    fn read32(&mut self, offset: u32) -> Result<u32> {
        let mut word = [0; 4];
        self.file.read_exact_at(&mut word, self.position(offset)?)?;
        Ok(u32::from_le_bytes(word))
    }

    fn write32(&mut self, offset: u32, value: u32) -> Result<()> {
        self.file
            .write_all_at(&value.to_le_bytes(), self.position(offset)?)?;
        Ok(())
    }
}
