//! Index meta page: identity fields and the root pointer.

use keel_common::page::PageNo;
use keel_common::{KeelError, KeyType, Result};

/// Width of the NUL-padded relation name field.
pub const RELATION_NAME_LEN: usize = 64;

const ATTR_OFFSET_AT: usize = 64;
const KEY_TYPE_AT: usize = 68;
const ROOT_IS_LEAF_AT: usize = 69;
const ROOT_PAGE_NO_AT: usize = 72;

/// Contents of the index file's header page.
///
/// Layout: relation_name (64, NUL-padded) | attr_byte_offset (4) |
/// key_type tag (1) | root_is_leaf (1) | reserved (2) | root_page_no (4).
///
/// The three identity fields must match the caller's arguments when an
/// existing index is opened. `root_is_leaf` records explicitly whether the
/// root has ever split, so nothing is inferred from page numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub relation_name: String,
    pub attr_byte_offset: u32,
    pub key_type: KeyType,
    pub root_page_no: PageNo,
    pub root_is_leaf: bool,
}

impl IndexMeta {
    /// Writes the meta fields into a page buffer.
    ///
    /// The relation name must fit the fixed field; callers validate length
    /// before an index file is ever created.
    pub fn write_to(&self, page: &mut [u8]) {
        let name = self.relation_name.as_bytes();
        page[..RELATION_NAME_LEN].fill(0);
        page[..name.len()].copy_from_slice(name);
        page[ATTR_OFFSET_AT..ATTR_OFFSET_AT + 4]
            .copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        page[KEY_TYPE_AT] = self.key_type as u8;
        page[ROOT_IS_LEAF_AT] = self.root_is_leaf as u8;
        page[ROOT_PAGE_NO_AT..ROOT_PAGE_NO_AT + 4]
            .copy_from_slice(&self.root_page_no.to_le_bytes());
    }

    /// Reads the meta fields back from a page buffer.
    pub fn read_from(page: &[u8]) -> Result<Self> {
        let name_field = &page[..RELATION_NAME_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_LEN);
        let relation_name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let key_type = KeyType::from_tag(page[KEY_TYPE_AT]).ok_or_else(|| {
            KeelError::BadIndexInfo(format!("unknown key type tag {}", page[KEY_TYPE_AT]))
        })?;

        Ok(Self {
            relation_name,
            attr_byte_offset: u32::from_le_bytes([
                page[ATTR_OFFSET_AT],
                page[ATTR_OFFSET_AT + 1],
                page[ATTR_OFFSET_AT + 2],
                page[ATTR_OFFSET_AT + 3],
            ]),
            key_type,
            root_page_no: u32::from_le_bytes([
                page[ROOT_PAGE_NO_AT],
                page[ROOT_PAGE_NO_AT + 1],
                page[ROOT_PAGE_NO_AT + 2],
                page[ROOT_PAGE_NO_AT + 3],
            ]),
            root_is_leaf: page[ROOT_IS_LEAF_AT] != 0,
        })
    }

    /// Rewrites only the root fields, in place.
    pub fn update_root_in_slice(page: &mut [u8], root_page_no: PageNo, root_is_leaf: bool) {
        page[ROOT_IS_LEAF_AT] = root_is_leaf as u8;
        page[ROOT_PAGE_NO_AT..ROOT_PAGE_NO_AT + 4].copy_from_slice(&root_page_no.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_common::page::PAGE_SIZE;

    #[test]
    fn test_meta_roundtrip() {
        let meta = IndexMeta {
            relation_name: "employees".to_string(),
            attr_byte_offset: 12,
            key_type: KeyType::Int32,
            root_page_no: 2,
            root_is_leaf: true,
        };

        let mut page = [0u8; PAGE_SIZE];
        meta.write_to(&mut page);
        assert_eq!(IndexMeta::read_from(&page).unwrap(), meta);
    }

    #[test]
    fn test_update_root_in_slice() {
        let meta = IndexMeta {
            relation_name: "employees".to_string(),
            attr_byte_offset: 0,
            key_type: KeyType::Int32,
            root_page_no: 2,
            root_is_leaf: true,
        };
        let mut page = [0u8; PAGE_SIZE];
        meta.write_to(&mut page);

        IndexMeta::update_root_in_slice(&mut page, 97, false);

        let read = IndexMeta::read_from(&page).unwrap();
        assert_eq!(read.root_page_no, 97);
        assert!(!read.root_is_leaf);
        assert_eq!(read.relation_name, "employees");
    }

    #[test]
    fn test_bad_key_type_tag() {
        let mut page = [0u8; PAGE_SIZE];
        IndexMeta {
            relation_name: "r".to_string(),
            attr_byte_offset: 0,
            key_type: KeyType::Int32,
            root_page_no: 2,
            root_is_leaf: true,
        }
        .write_to(&mut page);
        page[KEY_TYPE_AT] = 0xFF;

        assert!(matches!(
            IndexMeta::read_from(&page),
            Err(KeelError::BadIndexInfo(_))
        ));
    }
}
