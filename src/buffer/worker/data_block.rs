//! Persistence worker for columnar data blocks.

use std::sync::Arc;

use crate::buffer::{DataBlock, Payload, PersistenceWorker, WorkerKind};
use crate::common::config::DEFAULT_BLOCK_SIZE;
use crate::common::{Error, ResourceUsage, Result};
use crate::storage::{BlockHeader, FileHandler};
use crate::storage_error;

/// Persists [`DataBlock`] payloads as a [`BlockHeader`] followed by the
/// block's bytes.
#[derive(Debug, Clone)]
pub struct DataBlockWorker {
    block_size: usize,
    usage: Arc<ResourceUsage>,
}

impl DataBlockWorker {
    /// Create a worker for blocks of `block_size` bytes.
    pub fn new(block_size: usize, usage: Arc<ResourceUsage>) -> Self {
        Self { block_size, usage }
    }

    /// Worker for [`DEFAULT_BLOCK_SIZE`] blocks.
    pub fn with_default_size(usage: Arc<ResourceUsage>) -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, usage)
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl PersistenceWorker for DataBlockWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::DataBlock
    }

    fn estimated_size(&self) -> usize {
        self.block_size
    }

    fn allocate_in_memory(&self, slot: &mut Option<Payload>) -> Result<()> {
        if slot.is_some() {
            return Err(Error::AlreadyAllocated);
        }
        *slot = Some(Payload::DataBlock(DataBlock::new(self.block_size)));
        self.usage.record_alloc(self.estimated_size());
        Ok(())
    }

    fn free_in_memory(&self, slot: &mut Option<Payload>) -> Result<()> {
        if slot.take().is_none() {
            return Err(Error::NotAllocated);
        }
        self.usage.record_free(self.estimated_size());
        Ok(())
    }

    fn read_from_file_impl(&self, payload: &mut Payload, file: &mut FileHandler) -> Result<()> {
        let kind = payload.kind();
        let block = payload
            .as_data_block_mut()
            .ok_or_else(|| storage_error!("expected a data block payload, found {}", kind))?;

        let mut header = [0u8; BlockHeader::SIZE];
        file.read(&mut header)?;
        let header = BlockHeader::from_bytes(&header)?;

        if header.len > self.block_size as u64 {
            return Err(storage_error!(
                "data block holds {} bytes, block size is {}",
                header.len,
                self.block_size
            ));
        }

        let mut data = vec![0u8; header.len as usize];
        file.read(&mut data)?;
        header.verify(&data)?;

        block.load(data);
        Ok(())
    }

    fn write_to_file_impl(&self, payload: &Payload, file: &mut FileHandler) -> Result<()> {
        let block = payload
            .as_data_block()
            .ok_or_else(|| storage_error!("expected a data block payload, found {}", payload.kind()))?;

        let header = BlockHeader::for_data(block.as_slice());
        file.write(&header.to_bytes())?;
        file.write(block.as_slice())?;
        Ok(())
    }
}
