use embedded_hal::{delay, spi};
use lasercam_common::preset::{PresetStorage, PresetStore, PRESET_BLOB_SIZE};
use w25q::W25Q;

pub trait FlashInterface {
    type Error;
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error>;
    fn write_page(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error>;

    const PAGE_SIZE: usize;
    const SECTOR_SIZE: usize;
}

impl<S, D> FlashInterface for W25Q<S, D>
where
    S: spi::SpiDevice,
    D: delay::DelayNs,
{
    type Error = S::Error;
    const PAGE_SIZE: usize = w25q::PAGE_SIZE as usize;
    const SECTOR_SIZE: usize = w25q::SECTOR_SIZE as usize;

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        W25Q::read(self, address, buf)?;
        Ok(())
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error> {
        self.sector_erase(address)?;
        Ok(())
    }

    fn write_page(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        self.page_program(address, data)?;
        Ok(())
    }
}

/// Presets kept in one reserved flash sector. The blob fits in the first
/// page; saving erases the whole sector first.
pub struct FlashPresets<DEV: FlashInterface> {
    dev: DEV,
    address: u32,
}

impl<DEV: FlashInterface> FlashPresets<DEV> {
    /// `address` must be sector aligned.
    pub fn new(dev: DEV, address: u32) -> Self {
        debug_assert!(address as usize % DEV::SECTOR_SIZE == 0);
        Self { dev, address }
    }
}

impl<DEV: FlashInterface> PresetStorage for FlashPresets<DEV> {
    type Error = DEV::Error;

    fn load(&mut self) -> Result<Option<PresetStore>, DEV::Error> {
        let mut blob = [0u8; PRESET_BLOB_SIZE];
        self.dev.read(self.address, &mut blob)?;
        Ok(PresetStore::from_bytes(&blob))
    }

    fn save(&mut self, store: &PresetStore) -> Result<(), DEV::Error> {
        let blob = store.to_bytes();
        let mut current = [0u8; PRESET_BLOB_SIZE];
        self.dev.read(self.address, &mut current)?;
        if current == blob {
            return Ok(());
        }
        self.dev.erase_sector(self.address)?;
        self.dev.write_page(self.address, &blob)
    }
}
