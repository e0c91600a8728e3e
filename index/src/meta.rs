use chrono::{DateTime, Utc};
use facesrec_types::{Label, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// On-disk shape of `<metaPath>`. Field names
/// (`idMap`, `reverseIdMap`) are an explicit on-disk contract, not an
/// implementation detail, so they keep their camelCase JSON names.
#[derive(Serialize, Deserialize)]
pub(crate) struct PersistedMeta {
    #[serde(rename = "nextLabel")]
    pub next_label: u64,
    #[serde(rename = "lastRebuildAt")]
    pub last_rebuild_at: Option<DateTime<Utc>>,
    #[serde(rename = "idMap")]
    pub id_map: Vec<(u64, PersistedEntry)>,
    #[serde(rename = "reverseIdMap")]
    pub reverse_id_map: Vec<(u64, u64)>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct PersistedEntry {
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "clientRef")]
    pub client_ref: String,
    /// The raw descriptor, persisted alongside its label so the graph can be
    /// reconstructed on load without relying on `hnsw_rs`'s own dump/reload
    /// path (see the module doc on why that path isn't used).
    pub descriptor: Vec<f32>,
}

impl PersistedMeta {
    pub(crate) fn from_state(
        next_label: u64,
        last_rebuild_at: Option<DateTime<Utc>>,
        label_to_meta: &HashMap<Label, facesrec_types::IndexEntry>,
        label_to_descriptor: &HashMap<Label, facesrec_types::Descriptor>,
        user_to_label: &HashMap<UserId, Label>,
    ) -> Self {
        Self {
            next_label,
            last_rebuild_at,
            id_map: label_to_meta
                .iter()
                .filter_map(|(label, entry)| {
                    let descriptor = label_to_descriptor.get(label)?;
                    Some((
                        label.0,
                        PersistedEntry {
                            user_id: entry.user_id.0,
                            external_id: entry.external_id.clone(),
                            display_name: entry.display_name.clone(),
                            client_ref: entry.client_ref.clone(),
                            descriptor: descriptor.as_slice().to_vec(),
                        },
                    ))
                })
                .collect(),
            reverse_id_map: user_to_label.iter().map(|(u, l)| (u.0, l.0)).collect(),
        }
    }

    pub(crate) fn into_state(
        self,
    ) -> (
        u64,
        Option<DateTime<Utc>>,
        HashMap<Label, facesrec_types::IndexEntry>,
        HashMap<Label, Vec<f32>>,
        HashMap<UserId, Label>,
    ) {
        let mut label_to_meta = HashMap::with_capacity(self.id_map.len());
        let mut label_to_descriptor = HashMap::with_capacity(self.id_map.len());
        for (label, entry) in self.id_map {
            label_to_meta.insert(
                Label(label),
                facesrec_types::IndexEntry {
                    label: Label(label),
                    user_id: UserId(entry.user_id),
                    external_id: entry.external_id,
                    display_name: entry.display_name,
                    client_ref: entry.client_ref,
                },
            );
            label_to_descriptor.insert(Label(label), entry.descriptor);
        }
        let user_to_label = self
            .reverse_id_map
            .into_iter()
            .map(|(u, l)| (UserId(u), Label(l)))
            .collect();
        (
            self.next_label,
            self.last_rebuild_at,
            label_to_meta,
            label_to_descriptor,
            user_to_label,
        )
    }
}
