//! Disk-resident B+ tree secondary index over one integer attribute.

use crate::btree::constants::KEY_SIZE;
use crate::btree::meta::{IndexMeta, RELATION_NAME_LEN};
use crate::btree::node::{InnerNode, LeafNode};
use crate::bufmgr::BufferManager;
use crate::heap::HeapFile;
use crate::rid::RecordId;
use keel_common::page::{PageNo, INVALID_PAGE_NO};
use keel_common::{KeelError, KeyType, Result};
use std::sync::Arc;

/// Comparison operator for one bound of a range scan.
///
/// The lower bound takes `Gt`/`Gte`, the upper bound `Lt`/`Lte`; any other
/// combination is rejected with `BadOpcodes` at scan start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A child page produced by a split, waiting to be wired into its parent.
#[derive(Debug, Clone, Copy)]
struct SplitChild {
    page_no: PageNo,
    sep_key: i32,
}

enum ScanState {
    Inactive,
    Active {
        /// The leaf currently pinned for the scan.
        page_no: PageNo,
        /// Slot the next result comes from.
        next_entry: usize,
        low: i32,
        low_op: RangeOp,
        high: i32,
        high_op: RangeOp,
    },
    Exhausted {
        /// Last leaf the scan touched; may or may not still be pinned.
        page_no: PageNo,
    },
}

/// B+ tree index mapping one i32 attribute of a heap relation to record ids.
///
/// The index lives in its own page file named `"{relation}.{attr_offset}"`:
/// a meta page followed by leaf and inner node pages in allocation order.
/// Supports bulk construction from the source relation, point insertion, and
/// bounded forward range scans. Entries are never deleted.
pub struct BTreeIndex {
    bufmgr: Arc<BufferManager>,
    file_id: u32,
    file_name: String,
    header_page_no: PageNo,
    root_page_no: PageNo,
    root_is_leaf: bool,
    scan: ScanState,
    closed: bool,
}

fn decode_key(bytes: &[u8]) -> Result<i32> {
    match bytes.get(..KEY_SIZE) {
        Some(raw) => {
            let mut buf = [0u8; KEY_SIZE];
            buf.copy_from_slice(raw);
            Ok(i32::from_le_bytes(buf))
        }
        None => Err(KeelError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        }),
    }
}

fn admits_lower(op: RangeOp, key: i32, bound: i32) -> bool {
    match op {
        RangeOp::Gt => key > bound,
        RangeOp::Gte => key >= bound,
        _ => false,
    }
}

fn admits_upper(op: RangeOp, key: i32, bound: i32) -> bool {
    match op {
        RangeOp::Lt => key < bound,
        RangeOp::Lte => key <= bound,
        _ => false,
    }
}

impl BTreeIndex {
    /// Opens the index for `relation_name` over the attribute at
    /// `attr_byte_offset`, creating and bulk-loading it if no index file
    /// exists yet.
    ///
    /// On open of an existing file the meta page's identity fields must
    /// match the arguments exactly or `BadIndexInfo` is returned and the
    /// file is left untouched.
    pub fn open(
        bufmgr: Arc<BufferManager>,
        relation_name: &str,
        attr_byte_offset: usize,
        key_type: KeyType,
    ) -> Result<Self> {
        if relation_name.len() >= RELATION_NAME_LEN {
            return Err(KeelError::NameTooLong {
                name: relation_name.to_string(),
                max: RELATION_NAME_LEN - 1,
            });
        }

        let file_name = format!("{}.{}", relation_name, attr_byte_offset);
        match bufmgr.store().open(&file_name) {
            Ok(file_id) => Self::open_existing(
                bufmgr,
                file_id,
                file_name,
                relation_name,
                attr_byte_offset,
                key_type,
            ),
            Err(KeelError::FileNotFound { .. }) => {
                Self::create_and_load(bufmgr, file_name, relation_name, attr_byte_offset, key_type)
            }
            Err(e) => Err(e),
        }
    }

    fn open_existing(
        bufmgr: Arc<BufferManager>,
        file_id: u32,
        file_name: String,
        relation_name: &str,
        attr_byte_offset: usize,
        key_type: KeyType,
    ) -> Result<Self> {
        let header_page_no = bufmgr.store().first_page_no(file_id)?;

        let frame = bufmgr.read_page(file_id, header_page_no)?;
        let meta = {
            let data = frame.read_data();
            IndexMeta::read_from(&**data)
        };
        bufmgr.unpin_page(file_id, header_page_no, false)?;

        let verified = meta.and_then(|meta| {
            if meta.relation_name != relation_name
                || meta.attr_byte_offset as usize != attr_byte_offset
                || meta.key_type != key_type
            {
                Err(KeelError::BadIndexInfo(format!(
                    "'{}' was built over {}.{} ({})",
                    file_name, meta.relation_name, meta.attr_byte_offset, meta.key_type
                )))
            } else {
                Ok(meta)
            }
        });

        let meta = match verified {
            Ok(meta) => meta,
            Err(e) => {
                bufmgr.store().close(file_id).ok();
                return Err(e);
            }
        };

        Ok(Self {
            bufmgr,
            file_id,
            file_name,
            header_page_no,
            root_page_no: meta.root_page_no,
            root_is_leaf: meta.root_is_leaf,
            scan: ScanState::Inactive,
            closed: false,
        })
    }

    fn create_and_load(
        bufmgr: Arc<BufferManager>,
        file_name: String,
        relation_name: &str,
        attr_byte_offset: usize,
        key_type: KeyType,
    ) -> Result<Self> {
        let file_id = bufmgr.store().create(&file_name)?;

        // The meta page is the file header; the root starts as an empty leaf
        let (header_page_no, meta_frame) = bufmgr.alloc_page(file_id)?;
        let (root_page_no, _root_frame) = bufmgr.alloc_page(file_id)?;
        bufmgr.unpin_page(file_id, root_page_no, true)?;

        let meta = IndexMeta {
            relation_name: relation_name.to_string(),
            attr_byte_offset: attr_byte_offset as u32,
            key_type,
            root_page_no,
            root_is_leaf: true,
        };
        {
            let mut data = meta_frame.write_data();
            meta.write_to(&mut **data);
        }
        bufmgr.unpin_page(file_id, header_page_no, true)?;

        let mut index = Self {
            bufmgr,
            file_id,
            file_name,
            header_page_no,
            root_page_no,
            root_is_leaf: true,
            scan: ScanState::Inactive,
            closed: false,
        };
        index.bulk_load(relation_name, attr_byte_offset)?;
        index.bufmgr.flush_file(file_id)?;
        Ok(index)
    }

    /// Inserts one entry per record of the source relation, extracting the
    /// key at the attribute offset.
    fn bulk_load(&mut self, relation_name: &str, attr_byte_offset: usize) -> Result<()> {
        let heap = HeapFile::open(Arc::clone(&self.bufmgr), relation_name)?;
        let mut scan = heap.scan()?;
        while let Some((rid, record)) = scan.next_record()? {
            let end = attr_byte_offset + KEY_SIZE;
            if record.len() < end {
                return Err(KeelError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: record.len().saturating_sub(attr_byte_offset),
                });
            }
            self.insert_entry(&record[attr_byte_offset..end], rid)?;
        }
        Ok(())
    }

    /// Returns the derived index file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Inserts an entry. `key` holds the little-endian i32 key bytes.
    ///
    /// Duplicate keys are stored as distinct entries; no uniqueness check is
    /// made.
    pub fn insert_entry(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        let key = decode_key(key)?;
        let pending = self.place(self.root_page_no, self.root_is_leaf, key, rid)?;
        if let Some(split) = pending {
            self.grow_root(split)?;
        }
        Ok(())
    }

    /// Recursive descent: place the entry in the subtree rooted at
    /// `page_no`, splitting on the way back up.
    ///
    /// The returned `SplitChild` is the pending right sibling the caller
    /// must wire into itself (or grow a new root for). Each frame pins its
    /// own page for the duration of the call and unpins it on every exit.
    fn place(
        &mut self,
        page_no: PageNo,
        is_leaf: bool,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<SplitChild>> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let frame = bufmgr.read_page(self.file_id, page_no)?;

        if is_leaf {
            let mut data = frame.write_data();
            if !LeafNode::is_full(&**data) {
                LeafNode::place(&mut **data, key, rid);
                drop(data);
                bufmgr.unpin_page(self.file_id, page_no, true)?;
                return Ok(None);
            }

            let split = self.split_leaf(&mut **data, key, rid);
            drop(data);
            match split {
                Ok(split) => {
                    bufmgr.unpin_page(self.file_id, page_no, true)?;
                    Ok(Some(split))
                }
                Err(e) => {
                    bufmgr.unpin_page(self.file_id, page_no, true).ok();
                    Err(e)
                }
            }
        } else {
            let (child_page_no, child_is_leaf) = {
                let data = frame.read_data();
                let index = InnerNode::locate_child(&**data, key);
                (
                    InnerNode::child_at(&**data, index),
                    InnerNode::level(&**data) == 1,
                )
            };

            let pending = match self.place(child_page_no, child_is_leaf, key, rid) {
                Ok(pending) => pending,
                Err(e) => {
                    bufmgr.unpin_page(self.file_id, page_no, false).ok();
                    return Err(e);
                }
            };

            let Some(split) = pending else {
                bufmgr.unpin_page(self.file_id, page_no, false)?;
                return Ok(None);
            };

            let mut data = frame.write_data();
            if !InnerNode::is_full(&**data) {
                InnerNode::place_child(&mut **data, split.sep_key, split.page_no);
                drop(data);
                bufmgr.unpin_page(self.file_id, page_no, true)?;
                return Ok(None);
            }

            let result = self.split_inner(&mut **data, split);
            drop(data);
            match result {
                Ok(out) => {
                    bufmgr.unpin_page(self.file_id, page_no, true)?;
                    Ok(Some(out))
                }
                Err(e) => {
                    bufmgr.unpin_page(self.file_id, page_no, true).ok();
                    Err(e)
                }
            }
        }
    }

    /// Allocates a right sibling and splits a full leaf into it.
    fn split_leaf(&self, left: &mut [u8], key: i32, rid: RecordId) -> Result<SplitChild> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let (right_page_no, right_frame) = bufmgr.alloc_page(self.file_id)?;
        let sep_key = {
            let mut right = right_frame.write_data();
            LeafNode::split_into(left, &mut **right, right_page_no, key, rid)
        };
        bufmgr.unpin_page(self.file_id, right_page_no, true)?;
        Ok(SplitChild {
            page_no: right_page_no,
            sep_key,
        })
    }

    /// Allocates a right sibling and splits a full inner node into it.
    fn split_inner(&self, left: &mut [u8], pending: SplitChild) -> Result<SplitChild> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let (right_page_no, right_frame) = bufmgr.alloc_page(self.file_id)?;
        let sep_key = {
            let mut right = right_frame.write_data();
            InnerNode::split_into(left, &mut **right, pending.sep_key, pending.page_no)
        };
        bufmgr.unpin_page(self.file_id, right_page_no, true)?;
        Ok(SplitChild {
            page_no: right_page_no,
            sep_key,
        })
    }

    /// Adds a level: the old root and the pending child become the two
    /// children of a fresh root. This is the only place the meta page's root
    /// pointer changes.
    fn grow_root(&mut self, split: SplitChild) -> Result<()> {
        let bufmgr = Arc::clone(&self.bufmgr);

        let (new_root_no, frame) = bufmgr.alloc_page(self.file_id)?;
        {
            let mut data = frame.write_data();
            let level = if self.root_is_leaf { 1 } else { 0 };
            InnerNode::init(
                &mut **data,
                level,
                self.root_page_no,
                split.sep_key,
                split.page_no,
            );
        }
        bufmgr.unpin_page(self.file_id, new_root_no, true)?;

        let meta_frame = bufmgr.read_page(self.file_id, self.header_page_no)?;
        {
            let mut data = meta_frame.write_data();
            IndexMeta::update_root_in_slice(&mut **data, new_root_no, false);
        }
        bufmgr.unpin_page(self.file_id, self.header_page_no, true)?;

        self.root_page_no = new_root_no;
        self.root_is_leaf = false;
        Ok(())
    }

    /// Starts a forward scan over entries whose key satisfies
    /// `(key low_op low) ∧ (key high_op high)`.
    ///
    /// The bounds hold little-endian i32 key bytes. A scan already in
    /// progress is quietly ended first. Fails with `BadOpcodes` for operator
    /// misuse, `BadScanRange` if `low > high`, and `NoSuchKeyFound` if no
    /// entry qualifies.
    pub fn start_scan(
        &mut self,
        low: &[u8],
        low_op: RangeOp,
        high: &[u8],
        high_op: RangeOp,
    ) -> Result<()> {
        if !matches!(low_op, RangeOp::Gt | RangeOp::Gte)
            || !matches!(high_op, RangeOp::Lt | RangeOp::Lte)
        {
            return Err(KeelError::BadOpcodes);
        }
        let low = decode_key(low)?;
        let high = decode_key(high)?;
        if low > high {
            return Err(KeelError::BadScanRange);
        }

        if !matches!(self.scan, ScanState::Inactive) {
            self.end_scan()?;
        }

        let leaf_page_no = self.find_scan_leaf(low, low_op)?;
        self.position_scan(leaf_page_no, low, low_op, high, high_op)
    }

    /// Descends to the leftmost leaf that can hold a qualifying key.
    ///
    /// Each inner node is pinned only while its child pointer is read.
    fn find_scan_leaf(&self, low: i32, low_op: RangeOp) -> Result<PageNo> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let target = if low_op == RangeOp::Gt {
            low.saturating_add(1)
        } else {
            low
        };

        let mut page_no = self.root_page_no;
        let mut is_leaf = self.root_is_leaf;
        while !is_leaf {
            let frame = bufmgr.read_page(self.file_id, page_no)?;
            let (child, child_is_leaf) = {
                let data = frame.read_data();
                let index = InnerNode::locate_child(&**data, target);
                (
                    InnerNode::child_at(&**data, index),
                    InnerNode::level(&**data) == 1,
                )
            };
            bufmgr.unpin_page(self.file_id, page_no, false)?;
            page_no = child;
            is_leaf = child_is_leaf;
        }
        Ok(page_no)
    }

    /// Walks the sibling chain from `first_leaf` until an entry satisfies
    /// both bounds, leaving that leaf pinned as the scan position.
    fn position_scan(
        &mut self,
        first_leaf: PageNo,
        low: i32,
        low_op: RangeOp,
        high: i32,
        high_op: RangeOp,
    ) -> Result<()> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let mut page_no = first_leaf;

        loop {
            let frame = bufmgr.read_page(self.file_id, page_no)?;
            let (found, past_upper, right_sib) = {
                let data = frame.read_data();
                let n = LeafNode::entry_count(&**data);
                let mut found = None;
                let mut past_upper = false;
                for slot in 0..n {
                    let key = LeafNode::key_at(&**data, slot);
                    if !admits_upper(high_op, key, high) {
                        past_upper = true;
                        break;
                    }
                    if admits_lower(low_op, key, low) {
                        found = Some(slot);
                        break;
                    }
                }
                (found, past_upper, LeafNode::right_sibling(&**data))
            };

            if let Some(next_entry) = found {
                // This leaf stays pinned until the scan moves on or ends
                self.scan = ScanState::Active {
                    page_no,
                    next_entry,
                    low,
                    low_op,
                    high,
                    high_op,
                };
                return Ok(());
            }

            bufmgr.unpin_page(self.file_id, page_no, false)?;
            if past_upper || right_sib == INVALID_PAGE_NO {
                return Err(KeelError::NoSuchKeyFound);
            }
            page_no = right_sib;
        }
    }

    /// Returns the record id at the scan position and advances it.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let (page_no, next_entry, low, low_op, high, high_op) = match self.scan {
            ScanState::Inactive => return Err(KeelError::ScanNotInitialized),
            ScanState::Exhausted { .. } => return Err(KeelError::IndexScanCompleted),
            ScanState::Active {
                page_no,
                next_entry,
                low,
                low_op,
                high,
                high_op,
            } => (page_no, next_entry, low, low_op, high, high_op),
        };

        let bufmgr = Arc::clone(&self.bufmgr);

        // Briefly double-pin the current leaf to read it
        let frame = bufmgr.read_page(self.file_id, page_no)?;
        let (rid, entry_count, next_in_leaf_ok, right_sib) = {
            let data = frame.read_data();
            let n = LeafNode::entry_count(&**data);
            let rid = LeafNode::rid_at(&**data, next_entry);
            let next_ok = next_entry + 1 < n
                && admits_upper(high_op, LeafNode::key_at(&**data, next_entry + 1), high);
            (rid, n, next_ok, LeafNode::right_sibling(&**data))
        };
        bufmgr.unpin_page(self.file_id, page_no, false)?;

        if next_in_leaf_ok {
            self.scan = ScanState::Active {
                page_no,
                next_entry: next_entry + 1,
                low,
                low_op,
                high,
                high_op,
            };
            return Ok(rid);
        }

        if next_entry + 1 >= entry_count && right_sib != INVALID_PAGE_NO {
            // Hop: release this leaf before pinning its sibling
            bufmgr.unpin_page(self.file_id, page_no, false)?;
            let sib_frame = bufmgr.read_page(self.file_id, right_sib)?;
            let first_key_ok = {
                let data = sib_frame.read_data();
                LeafNode::entry_count(&**data) > 0
                    && admits_upper(high_op, LeafNode::key_at(&**data, 0), high)
            };
            if first_key_ok {
                self.scan = ScanState::Active {
                    page_no: right_sib,
                    next_entry: 0,
                    low,
                    low_op,
                    high,
                    high_op,
                };
            } else {
                bufmgr.unpin_page(self.file_id, right_sib, false)?;
                self.scan = ScanState::Exhausted {
                    page_no: right_sib,
                };
            }
            return Ok(rid);
        }

        // Keys still follow in this leaf but none qualifies, or the chain ends
        self.scan = ScanState::Exhausted { page_no };
        Ok(rid)
    }

    /// Ends the scan, unpinning its leaf.
    ///
    /// The leaf may already be unpinned or evicted (a prior `scan_next`
    /// released it when the scan ran dry); exactly those two cases are
    /// tolerated here.
    pub fn end_scan(&mut self) -> Result<()> {
        let page_no = match self.scan {
            ScanState::Inactive => return Err(KeelError::ScanNotInitialized),
            ScanState::Active { page_no, .. } | ScanState::Exhausted { page_no } => page_no,
        };
        self.scan = ScanState::Inactive;

        match self.bufmgr.unpin_page(self.file_id, page_no, false) {
            Ok(())
            | Err(KeelError::PageNotPinned { .. })
            | Err(KeelError::PageNotCached { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Flushes the index and releases its file. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let scan_leaf = match std::mem::replace(&mut self.scan, ScanState::Inactive) {
            ScanState::Active { page_no, .. } | ScanState::Exhausted { page_no } => Some(page_no),
            ScanState::Inactive => None,
        };

        self.bufmgr.flush_file(self.file_id)?;

        if let Some(page_no) = scan_leaf {
            match self.bufmgr.unpin_page(self.file_id, page_no, false) {
                Ok(())
                | Err(KeelError::PageNotPinned { .. })
                | Err(KeelError::PageNotCached { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        self.bufmgr.store().close(self.file_id)?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::constants::{INNER_CAPACITY, LEAF_CAPACITY};
    use crate::store::FileStore;
    use keel_common::StorageConfig;
    use tempfile::tempdir;

    const ATTR_OFFSET: usize = 4;

    fn test_bufmgr(num_frames: usize) -> (Arc<BufferManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            FileStore::new(StorageConfig {
                data_dir: dir.path().to_path_buf(),
                buffer_pool_frames: num_frames,
                fsync_enabled: false,
            })
            .unwrap(),
        );
        (Arc::new(BufferManager::new(store)), dir)
    }

    /// A 16-byte record with the key at ATTR_OFFSET, as the relation stores it.
    fn record_with_key(key: i32) -> Vec<u8> {
        let mut record = vec![0u8; 16];
        record[..4].copy_from_slice(&0xC0FFEEu32.to_le_bytes());
        record[ATTR_OFFSET..ATTR_OFFSET + 4].copy_from_slice(&key.to_le_bytes());
        record
    }

    fn build_relation(bufmgr: &Arc<BufferManager>, name: &str, keys: &[i32]) -> Vec<RecordId> {
        let heap = HeapFile::create(Arc::clone(bufmgr), name).unwrap();
        let rids = keys
            .iter()
            .map(|&k| heap.append(&record_with_key(k)).unwrap())
            .collect();
        heap.flush().unwrap();
        rids
    }

    fn scan_all(index: &mut BTreeIndex) -> Vec<RecordId> {
        index
            .start_scan(
                &i32::MIN.to_le_bytes(),
                RangeOp::Gte,
                &i32::MAX.to_le_bytes(),
                RangeOp::Lte,
            )
            .unwrap();
        let mut out = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => out.push(rid),
                Err(KeelError::IndexScanCompleted) => break,
                Err(e) => panic!("scan failed: {e}"),
            }
        }
        index.end_scan().unwrap();
        out
    }

    #[test]
    fn test_bulk_load_and_full_scan() {
        let (bufmgr, _dir) = test_bufmgr(64);
        let keys: Vec<i32> = (0..1000).rev().collect();
        let rids = build_relation(&bufmgr, "emp", &keys);

        let mut index =
            BTreeIndex::open(Arc::clone(&bufmgr), "emp", ATTR_OFFSET, KeyType::Int32).unwrap();
        assert_eq!(index.file_name(), "emp.4");

        let scanned = scan_all(&mut index);
        assert_eq!(scanned.len(), 1000);

        // Keys come back ascending: key p was carried by the record appended
        // at position 999 - p
        for (pos, rid) in scanned.iter().enumerate() {
            assert_eq!(*rid, rids[999 - pos]);
        }
        assert_eq!(bufmgr.pinned_pages(index.file_id), 0);
    }

    #[test]
    fn test_point_inserts_after_open() {
        let (bufmgr, _dir) = test_bufmgr(64);
        build_relation(&bufmgr, "emp", &[]);

        let mut index =
            BTreeIndex::open(Arc::clone(&bufmgr), "emp", ATTR_OFFSET, KeyType::Int32).unwrap();

        for key in [5i32, 3, 9, 3, -1] {
            index
                .insert_entry(&key.to_le_bytes(), RecordId::new(1, key.unsigned_abs() as u16))
                .unwrap();
        }

        index
            .start_scan(
                &3i32.to_le_bytes(),
                RangeOp::Gte,
                &9i32.to_le_bytes(),
                RangeOp::Lt,
            )
            .unwrap();
        let mut rids = Vec::new();
        while let Ok(rid) = index.scan_next() {
            rids.push(rid);
        }
        index.end_scan().unwrap();

        // Two 3s and the 5; the 9 is excluded by LT
        assert_eq!(rids.len(), 3);
        assert_eq!(bufmgr.pinned_pages(index.file_id), 0);
    }

    #[test]
    fn test_invalid_key_bytes() {
        let (bufmgr, _dir) = test_bufmgr(64);
        build_relation(&bufmgr, "emp", &[]);
        let mut index =
            BTreeIndex::open(Arc::clone(&bufmgr), "emp", ATTR_OFFSET, KeyType::Int32).unwrap();

        assert!(matches!(
            index.insert_entry(&[1, 2], RecordId::new(1, 0)),
            Err(KeelError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_relation_name_too_long() {
        let (bufmgr, _dir) = test_bufmgr(64);
        let name = "x".repeat(RELATION_NAME_LEN);
        assert!(matches!(
            BTreeIndex::open(bufmgr, &name, 0, KeyType::Int32),
            Err(KeelError::NameTooLong { .. })
        ));
    }

    /// Builds a tree whose root is a full inner node over synthetic leaves,
    /// then inserts into a full leaf so the split propagates: leaf split,
    /// inner split, and a second root growth in one insert. Growing this
    /// organically would take ~840k inserts at the real fan-out.
    #[test]
    fn test_inner_split_and_root_growth() {
        let (bufmgr, _dir) = test_bufmgr(64);
        build_relation(&bufmgr, "emp", &[]);
        let mut index =
            BTreeIndex::open(Arc::clone(&bufmgr), "emp", ATTR_OFFSET, KeyType::Int32).unwrap();
        let file_id = index.file_id;

        // Leaf i covers keys from i * 10_000. Leaf 0 is full; the rest hold
        // one entry each so the page file stays small.
        let num_leaves = INNER_CAPACITY + 1;
        let mut leaf_pages = Vec::with_capacity(num_leaves);
        let mut expected_keys = Vec::new();
        for leaf in 0..num_leaves {
            let (page_no, frame) = bufmgr.alloc_page(file_id).unwrap();
            {
                let mut data = frame.write_data();
                if leaf == 0 {
                    for slot in 0..LEAF_CAPACITY {
                        let key = slot as i32;
                        LeafNode::place(&mut **data, key, RecordId::new(1, slot as u16));
                        expected_keys.push(key);
                    }
                } else {
                    let key = (leaf as i32) * 10_000;
                    LeafNode::place(&mut **data, key, RecordId::new(2, leaf as u16));
                    expected_keys.push(key);
                }
            }
            bufmgr.unpin_page(file_id, page_no, true).unwrap();
            leaf_pages.push(page_no);
        }
        for window in 0..num_leaves - 1 {
            let frame = bufmgr.read_page(file_id, leaf_pages[window]).unwrap();
            LeafNode::set_right_sibling(&mut **frame.write_data(), leaf_pages[window + 1]);
            bufmgr.unpin_page(file_id, leaf_pages[window], true).unwrap();
        }

        // Root: a full inner node with separator i*10_000 before leaf i
        let (root_no, root_frame) = bufmgr.alloc_page(file_id).unwrap();
        {
            let mut data = root_frame.write_data();
            InnerNode::init(&mut **data, 1, leaf_pages[0], 10_000, leaf_pages[1]);
            for leaf in 2..num_leaves {
                InnerNode::place_child(
                    &mut **data,
                    (leaf as i32) * 10_000,
                    leaf_pages[leaf],
                );
            }
            assert!(InnerNode::is_full(&**data));
        }
        bufmgr.unpin_page(file_id, root_no, true).unwrap();

        let meta_frame = bufmgr.read_page(file_id, index.header_page_no).unwrap();
        IndexMeta::update_root_in_slice(&mut **meta_frame.write_data(), root_no, false);
        bufmgr.unpin_page(file_id, index.header_page_no, true).unwrap();
        index.root_page_no = root_no;
        index.root_is_leaf = false;

        // One insert into the full leaf 0 cascades all the way to the root
        index
            .insert_entry(&500i32.to_le_bytes(), RecordId::new(3, 0))
            .unwrap();
        expected_keys.push(500);
        expected_keys.sort_unstable();

        assert_ne!(index.root_page_no, root_no);
        assert!(!index.root_is_leaf);
        assert_eq!(bufmgr.pinned_pages(file_id), 0);

        // The new root records the pushed-up separator and both halves
        {
            let frame = bufmgr.read_page(file_id, index.root_page_no).unwrap();
            let data = frame.read_data();
            assert_eq!(InnerNode::level(&**data), 0);
            assert_eq!(InnerNode::key_count(&**data), 1);
            assert_eq!(InnerNode::child_at(&**data, 0), root_no);
            drop(data);
            bufmgr.unpin_page(file_id, index.root_page_no, false).unwrap();
        }

        // Meta page agrees with the cached root
        {
            let frame = bufmgr.read_page(file_id, index.header_page_no).unwrap();
            let meta = IndexMeta::read_from(&**frame.read_data()).unwrap();
            bufmgr.unpin_page(file_id, index.header_page_no, false).unwrap();
            assert_eq!(meta.root_page_no, index.root_page_no);
            assert!(!meta.root_is_leaf);
        }

        // A three-level descent still finds every entry in order
        index
            .start_scan(
                &i32::MIN.to_le_bytes(),
                RangeOp::Gte,
                &i32::MAX.to_le_bytes(),
                RangeOp::Lte,
            )
            .unwrap();
        let mut count = 0;
        loop {
            match index.scan_next() {
                Ok(_) => count += 1,
                Err(KeelError::IndexScanCompleted) => break,
                Err(e) => panic!("scan failed: {e}"),
            }
        }
        index.end_scan().unwrap();
        assert_eq!(count, expected_keys.len());
        assert_eq!(bufmgr.pinned_pages(file_id), 0);
    }

    #[test]
    fn test_scan_positions_into_middle_leaf() {
        let (bufmgr, _dir) = test_bufmgr(64);
        // Three leaves' worth of keys: 0..2500
        let keys: Vec<i32> = (0..2500).collect();
        build_relation(&bufmgr, "emp", &keys);
        let mut index =
            BTreeIndex::open(Arc::clone(&bufmgr), "emp", ATTR_OFFSET, KeyType::Int32).unwrap();

        index
            .start_scan(
                &1000i32.to_le_bytes(),
                RangeOp::Gt,
                &1005i32.to_le_bytes(),
                RangeOp::Lte,
            )
            .unwrap();
        let mut rids = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => rids.push(rid),
                Err(KeelError::IndexScanCompleted) => break,
                Err(e) => panic!("{e}"),
            }
        }
        index.end_scan().unwrap();
        assert_eq!(rids.len(), 5); // 1001..=1005
    }
}
