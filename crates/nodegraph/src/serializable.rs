use crate::doc::Document;
use crate::error::Result;
use crate::ids::IdMap;

/// Conversion between a live entity and its [`Document`].
///
/// `deserialize` with `restore_id = true` takes the id stored in the
/// document and re-keys the registry entry (the previous entry is erased
/// first). With `restore_id = false` the entity keeps its fresh id, which is
/// how pasted copies get new identities.
pub trait Serializable {
    fn id(&self) -> &str;

    fn serialize(&self) -> Document;

    fn deserialize(&mut self, doc: &Document, registry: &mut IdMap, restore_id: bool) -> Result<()>;
}
