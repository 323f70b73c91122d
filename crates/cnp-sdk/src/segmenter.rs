//! Splitting content into signed, numbered blocks.

use crate::config::SegmenterConfig;
use crate::keys::KeyManager;
use crate::numbering::SegmentNumbering;
use cnp_core::{Block, ContentType, Error, KeyLocator, Name, PublisherId, Result, SignedInfo};
use cnp_flow::{DrainReport, FlowControlledBuffer};
use cnp_merkle::{LeafInput, MerkleSigningEngine};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-put parameters. Everything left unset falls back to the segmenter's
/// key manager or the defaults below.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Start of the slice of `content` to publish.
    pub offset: usize,
    /// Length of the slice; the rest of the content when unset.
    pub length: Option<usize>,
    /// Mark the last block written as the end of the object.
    pub is_final: bool,
    pub content_type: ContentType,
    pub freshness_seconds: Option<u32>,
    pub key_locator: Option<KeyLocator>,
    pub publisher: Option<PublisherId>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(mut self, offset: usize, length: usize) -> Self {
        self.offset = offset;
        self.length = Some(length);
        self
    }

    pub fn is_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn freshness(mut self, seconds: u32) -> Self {
        self.freshness_seconds = Some(seconds);
        self
    }

    pub fn key_locator(mut self, locator: KeyLocator) -> Self {
        self.key_locator = Some(locator);
        self
    }

    pub fn publisher(mut self, publisher: PublisherId) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

/// Writes content streams into a buffer as signed segments.
///
/// Numbering follows the root of the current stream: successive puts under
/// one root continue its sequence, and a put under a different root starts
/// over at the base index. While a stream is open its root is registered as
/// a namespace of the buffer; finishing the stream or dropping the segmenter
/// releases it. Puts take `&mut self`; concurrent writers to the same root
/// need separate coordination.
pub struct Segmenter<K: KeyManager> {
    buffer: FlowControlledBuffer,
    keys: Arc<K>,
    engine: MerkleSigningEngine,
    config: SegmenterConfig,
    next_sequence: u64,
    /// Root whose numbering `next_sequence` belongs to.
    stream_root: Option<Name>,
    /// Namespace this segmenter holds in the buffer.
    namespace: Option<Name>,
}

impl<K: KeyManager> Segmenter<K> {
    pub fn new(buffer: FlowControlledBuffer, keys: Arc<K>, config: SegmenterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer,
            keys,
            engine: MerkleSigningEngine::new(),
            next_sequence: config.numbering.base_index(),
            config,
            stream_root: None,
            namespace: None,
        })
    }

    /// Fixed-size blocks numbered `0, increment, 2 * increment, ...`.
    pub fn block_segmenter(
        buffer: FlowControlledBuffer,
        keys: Arc<K>,
        block_size: usize,
        increment: u64,
    ) -> Result<Self> {
        let config = SegmenterConfig::new(block_size, SegmentNumbering::FixedIncrement(increment))?;
        Self::new(buffer, keys, config)
    }

    /// Blocks numbered by byte offset.
    pub fn byte_count_segmenter(
        buffer: FlowControlledBuffer,
        keys: Arc<K>,
        block_size: usize,
    ) -> Result<Self> {
        let config = SegmenterConfig::new(block_size, SegmentNumbering::ByteCount)?;
        Self::new(buffer, keys, config)
    }

    /// Blocks numbered by byte offset divided by `scale`.
    pub fn scaled_byte_count_segmenter(
        buffer: FlowControlledBuffer,
        keys: Arc<K>,
        block_size: usize,
        scale: u64,
    ) -> Result<Self> {
        let config = SegmenterConfig::new(block_size, SegmentNumbering::ScaledByteCount(scale))?;
        Self::new(buffer, keys, config)
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn buffer(&self) -> &FlowControlledBuffer {
        &self.buffer
    }

    pub fn keys(&self) -> &Arc<K> {
        &self.keys
    }

    pub fn numbering(&self) -> SegmentNumbering {
        self.config.numbering
    }

    /// Switch numbering policy. Restarts the stream at the base index.
    pub fn set_numbering(&mut self, numbering: SegmentNumbering) -> Result<()> {
        numbering.validate()?;
        self.config.numbering = numbering;
        self.next_sequence = numbering.base_index();
        self.stream_root = None;
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        if block_size == 0 {
            return Err(Error::invalid("block size must be positive"));
        }
        self.config.block_size = block_size;
        Ok(())
    }

    /// Sequence number the next put under the current root starts at.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number the next put from `sequence`, whatever its root. Useful when
    /// writing sparse ranges.
    pub fn set_next_sequence(&mut self, sequence: u64) {
        self.next_sequence = sequence;
        self.stream_root = None;
    }

    /// Root of the stream currently being written, if any.
    pub fn stream_root(&self) -> Option<&Name> {
        self.stream_root.as_ref()
    }

    /// Sign `content[offset..offset + length]` under `name` and push the
    /// blocks into the buffer in sequence order. Returns the first block.
    ///
    /// A put under a new root starts numbering at the base index. Content
    /// shorter than one block becomes a single block at
    /// [`next_sequence`](Self::next_sequence) and leaves the numbering
    /// alone, so repeating such a put overwrites the earlier block. Longer
    /// content is cut into `block_size` blocks and signed as one batch;
    /// numbering only advances once every block is buffered, so a retry
    /// after a failure rewrites the same names.
    pub async fn put(&mut self, name: &Name, content: &[u8], options: PutOptions) -> Result<Block> {
        let PutOptions {
            offset,
            length,
            is_final,
            content_type,
            freshness_seconds,
            key_locator,
            publisher,
        } = options;

        let length = length.unwrap_or_else(|| content.len().saturating_sub(offset));
        let data = offset
            .checked_add(length)
            .filter(|&end| end <= content.len())
            .map(|end| &content[offset..end])
            .ok_or_else(|| {
                Error::invalid(format!(
                    "range {}+{} exceeds content of {} bytes",
                    offset,
                    length,
                    content.len()
                ))
            })?;

        let root = self.segment_root(name);
        let publisher = publisher.unwrap_or_else(|| self.keys.default_publisher());
        let key = self.keys.signing_key(&publisher)?;
        let locator = key_locator.unwrap_or_else(|| self.keys.key_locator(&key));
        let info = SignedInfo::new(publisher, content_type, locator).with_freshness(freshness_seconds);
        self.enter_stream(&root);

        let block_size = self.config.block_size;
        if data.len() < block_size {
            let sequence = self.next_sequence;
            let info = info.with_final_segment(is_final.then_some(sequence));
            let input = LeafInput::new(root.segment_name(sequence), sequence, data);
            let block = self.engine.sign_one(input, &info, &key)?;
            info!(name = %block.name(), length = data.len(), "putting block");
            let block = self.buffer.put(block).await?;
            if is_final {
                self.release_namespace();
            }
            return Ok(block);
        }

        let numbering = self.config.numbering;
        let mut sequence = self.next_sequence;
        let mut inputs = Vec::with_capacity(data.len().div_ceil(block_size));
        for chunk in data.chunks(block_size) {
            inputs.push(LeafInput::new(root.segment_name(sequence), sequence, chunk));
            sequence = numbering.next(sequence, chunk.len());
        }
        let last = inputs.last().map(|input| input.sequence_number);
        let info = info.with_final_segment(if is_final { last } else { None });

        let batch = self.engine.build_and_sign(inputs, &info, &key)?;
        debug!(
            root = %root,
            blocks = batch.blocks.len(),
            digest = %batch.root.short(),
            "signed segment batch"
        );

        let mut first = None;
        for block in batch.blocks {
            info!(name = %block.name(), length = block.payload().len(), "putting block");
            let block = self.buffer.put(block).await?;
            first.get_or_insert(block);
        }
        self.next_sequence = sequence;
        if is_final {
            self.release_namespace();
        }
        first.ok_or_else(|| Error::SigningFailure("batch produced no blocks".into()))
    }

    /// Put without ending the object.
    pub async fn update(&mut self, name: &Name, content: &[u8], options: PutOptions) -> Result<Block> {
        self.put(name, content, options.is_final(false)).await
    }

    /// Put and mark the last block as the end of the object.
    pub async fn finish(&mut self, name: &Name, content: &[u8], options: PutOptions) -> Result<Block> {
        self.put(name, content, options.is_final(true)).await
    }

    /// Close the underlying buffer.
    pub async fn close(&self) -> Result<DrainReport> {
        self.buffer.close().await
    }

    fn segment_root(&self, name: &Name) -> Name {
        if name.is_segment() {
            info!(name = %name, "name already carries a segment marker, stripping it");
        }
        name.segment_root()
    }

    /// Make `root` the current stream, restarting numbering if it changed,
    /// and hold its namespace in the buffer.
    fn enter_stream(&mut self, root: &Name) {
        if self.stream_root.as_ref().is_some_and(|current| current != root) {
            debug!(from = ?self.stream_root, to = %root, "new stream root, restarting numbering");
            self.next_sequence = self.config.numbering.base_index();
        }
        self.stream_root = Some(root.clone());

        if self.namespace.as_ref() != Some(root) {
            self.release_namespace();
            self.buffer.add_namespace(root.clone());
            self.namespace = Some(root.clone());
        }
    }

    fn release_namespace(&mut self) {
        if let Some(namespace) = self.namespace.take() {
            self.buffer.remove_namespace(&namespace);
        }
    }
}

impl<K: KeyManager> Drop for Segmenter<K> {
    fn drop(&mut self) {
        self.release_namespace();
    }
}

impl<K: KeyManager> std::fmt::Debug for Segmenter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("config", &self.config)
            .field("next_sequence", &self.next_sequence)
            .field("stream_root", &self.stream_root)
            .field("buffer", &self.buffer)
            .finish()
    }
}
