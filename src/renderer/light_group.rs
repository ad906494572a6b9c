// renderer/light_group.rs
//! Per-object light bookkeeping.
//!
//! A [`LightGroupId`] is the packed count of lights per category and doubles as
//! the light-shape half of a shader variant key. A [`LightGroup`] carries the
//! actual light indices, laid out as seven contiguous runs in category order.

pub const LIGHT_CATEGORY_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LightCategory {
    Ambient,
    Directional,
    Point,
    Spot,
    ShadowDirectional,
    ShadowPoint,
    ShadowSpot,
}

impl LightCategory {
    pub const ALL: [LightCategory; LIGHT_CATEGORY_COUNT] = [
        LightCategory::Ambient,
        LightCategory::Directional,
        LightCategory::Point,
        LightCategory::Spot,
        LightCategory::ShadowDirectional,
        LightCategory::ShadowPoint,
        LightCategory::ShadowSpot,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_shadow(self) -> bool {
        matches!(
            self,
            Self::ShadowDirectional | Self::ShadowPoint | Self::ShadowSpot
        )
    }

    /// The category a light lands in once its shadow map is no longer sampled.
    pub const fn without_shadow(self) -> Self {
        match self {
            Self::ShadowDirectional => Self::Directional,
            Self::ShadowPoint => Self::Point,
            Self::ShadowSpot => Self::Spot,
            other => other,
        }
    }

    /// Shadow-casting counterpart, `None` for ambient lights.
    pub const fn with_shadow(self) -> Option<Self> {
        match self {
            Self::Ambient => None,
            Self::Directional | Self::ShadowDirectional => Some(Self::ShadowDirectional),
            Self::Point | Self::ShadowPoint => Some(Self::ShadowPoint),
            Self::Spot | Self::ShadowSpot => Some(Self::ShadowSpot),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Directional => "directional",
            Self::Point => "point",
            Self::Spot => "spot",
            Self::ShadowDirectional => "shadow_directional",
            Self::ShadowPoint => "shadow_point",
            Self::ShadowSpot => "shadow_spot",
        }
    }
}

/// Light counts per category. Ordering is lexicographic over the seven
/// counters in [`LightCategory::ALL`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightGroupId {
    counts: [u16; LIGHT_CATEGORY_COUNT],
}

impl LightGroupId {
    pub const EMPTY: Self = Self {
        counts: [0; LIGHT_CATEGORY_COUNT],
    };

    pub const fn from_counts(counts: [u16; LIGHT_CATEGORY_COUNT]) -> Self {
        Self { counts }
    }

    pub const fn counts(&self) -> [u16; LIGHT_CATEGORY_COUNT] {
        self.counts
    }

    pub const fn count(&self, category: LightCategory) -> u16 {
        self.counts[category.index()]
    }

    pub fn set_count(&mut self, category: LightCategory, count: u16) {
        self.counts[category.index()] = count;
    }

    /// Saturates at `u16::MAX`.
    pub fn add(&mut self, category: LightCategory) {
        let slot = &mut self.counts[category.index()];
        *slot = slot.saturating_add(1);
    }

    /// Removing from an empty category is ignored.
    pub fn remove(&mut self, category: LightCategory) {
        let slot = &mut self.counts[category.index()];
        *slot = slot.saturating_sub(1);
    }

    pub fn start_index(&self, category: LightCategory) -> u32 {
        self.counts[..category.index()]
            .iter()
            .map(|&count| u32::from(count))
            .sum()
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().map(|&count| u32::from(count)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&count| count == 0)
    }

    pub fn shadow_light_count(&self) -> u32 {
        LightCategory::ALL
            .iter()
            .filter(|category| category.is_shadow())
            .map(|&category| u32::from(self.count(category)))
            .sum()
    }
}

macro_rules! light_group_id_accessors {
    ($($category:ident => $count:ident, $set:ident, $add:ident, $remove:ident, $start:ident;)*) => {
        impl LightGroupId {
            $(
                pub const fn $count(&self) -> u16 {
                    self.count(LightCategory::$category)
                }

                pub fn $set(&mut self, count: u16) {
                    self.set_count(LightCategory::$category, count);
                }

                pub fn $add(&mut self) {
                    self.add(LightCategory::$category);
                }

                pub fn $remove(&mut self) {
                    self.remove(LightCategory::$category);
                }

                pub fn $start(&self) -> u32 {
                    self.start_index(LightCategory::$category)
                }
            )*
        }
    };
}

light_group_id_accessors! {
    Ambient => ambient_count, set_ambient_count, add_ambient_light, remove_ambient_light, ambient_start_index;
    Directional => directional_count, set_directional_count, add_directional_light, remove_directional_light, directional_start_index;
    Point => point_count, set_point_count, add_point_light, remove_point_light, point_start_index;
    Spot => spot_count, set_spot_count, add_spot_light, remove_spot_light, spot_start_index;
    ShadowDirectional => shadow_directional_count, set_shadow_directional_count, add_shadow_directional_light, remove_shadow_directional_light, shadow_directional_start_index;
    ShadowPoint => shadow_point_count, set_shadow_point_count, add_shadow_point_light, remove_shadow_point_light, shadow_point_start_index;
    ShadowSpot => shadow_spot_count, set_shadow_spot_count, add_shadow_spot_light, remove_shadow_spot_light, shadow_spot_start_index;
}

/// Light indices partitioned into one contiguous run per category.
///
/// Appending to a category inserts at the end of that category's run, so
/// the layout stays valid whatever order categories are filled in. Filling
/// them in category order keeps every append at the tail of the vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightGroup {
    id: LightGroupId,
    indices: Vec<u32>,
}

impl LightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: LightGroupId::EMPTY,
            indices: Vec::with_capacity(capacity),
        }
    }

    pub fn id(&self) -> LightGroupId {
        self.id
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.id = LightGroupId::EMPTY;
        self.indices.clear();
    }

    pub fn start_index(&self, category: LightCategory) -> u32 {
        self.id.start_index(category)
    }

    pub fn lights(&self, category: LightCategory) -> &[u32] {
        let start = self.id.start_index(category) as usize;
        let end = start + self.id.count(category) as usize;
        &self.indices[start..end]
    }

    /// Returns `false` when the category is already at `u16::MAX` lights.
    pub fn add_light(&mut self, category: LightCategory, light_index: u32) -> bool {
        let count = self.id.count(category);
        if count == u16::MAX {
            log::warn!(
                "Light group is full for {} lights, dropping light {}",
                category.name(),
                light_index
            );
            return false;
        }
        let position = self.id.start_index(category) as usize + count as usize;
        if position == self.indices.len() {
            self.indices.push(light_index);
        } else {
            self.indices.insert(position, light_index);
        }
        self.id.add(category);
        true
    }

    /// Removes the first occurrence of `light_index` from the category's run.
    pub fn remove_light(&mut self, category: LightCategory, light_index: u32) -> bool {
        let start = self.id.start_index(category) as usize;
        let Some(offset) = self
            .lights(category)
            .iter()
            .position(|&index| index == light_index)
        else {
            return false;
        };
        self.indices.remove(start + offset);
        self.id.remove(category);
        true
    }

    pub fn contains(&self, category: LightCategory, light_index: u32) -> bool {
        self.lights(category).contains(&light_index)
    }

    /// Every light paired with its category, in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (LightCategory, u32)> + '_ {
        LightCategory::ALL.into_iter().flat_map(move |category| {
            self.lights(category)
                .iter()
                .map(move |&index| (category, index))
        })
    }
}

macro_rules! light_group_accessors {
    ($($category:ident => $add:ident, $lights:ident, $start:ident;)*) => {
        impl LightGroup {
            $(
                pub fn $add(&mut self, light_index: u32) -> bool {
                    self.add_light(LightCategory::$category, light_index)
                }

                pub fn $lights(&self) -> &[u32] {
                    self.lights(LightCategory::$category)
                }

                pub fn $start(&self) -> u32 {
                    self.start_index(LightCategory::$category)
                }
            )*
        }
    };
}

light_group_accessors! {
    Ambient => add_ambient_light, ambient_lights, ambient_light_start_index;
    Directional => add_directional_light, directional_lights, directional_light_start_index;
    Point => add_point_light, point_lights, point_light_start_index;
    Spot => add_spot_light, spot_lights, spot_light_start_index;
    ShadowDirectional => add_shadow_directional_light, shadow_directional_lights, shadow_directional_light_start_index;
    ShadowPoint => add_shadow_point_light, shadow_point_lights, shadow_point_light_start_index;
    ShadowSpot => add_shadow_spot_light, shadow_spot_lights, shadow_spot_light_start_index;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn remove_from_empty_category_is_ignored() {
        let mut id = LightGroupId::default();
        id.remove_point_light();
        assert_eq!(id.point_count(), 0);
        id.add_point_light();
        id.remove_point_light();
        id.remove_point_light();
        assert_eq!(id.point_count(), 0);
    }

    #[test]
    fn add_saturates_at_u16_max() {
        let mut id = LightGroupId::default();
        id.set_spot_count(u16::MAX);
        id.add_spot_light();
        assert_eq!(id.spot_count(), u16::MAX);
    }

    #[test]
    fn ordering_is_lexicographic_and_total() {
        let samples = [
            LightGroupId::from_counts([0, 0, 0, 0, 0, 0, 0]),
            LightGroupId::from_counts([0, 0, 1, 0, 0, 0, 0]),
            LightGroupId::from_counts([0, 0, 0, 5, 0, 0, 0]),
            LightGroupId::from_counts([1, 0, 0, 0, 0, 0, 0]),
            LightGroupId::from_counts([0, 0, 1, 0, 0, 0, 1]),
            LightGroupId::from_counts([0, 0, 1, 0, 0, 0, 1]),
        ];
        for a in &samples {
            for b in &samples {
                let relations = [a < b, a > b, a == b];
                assert_eq!(relations.iter().filter(|&&r| r).count(), 1, "{a:?} vs {b:?}");
            }
        }
        assert_eq!(samples[1].cmp(&samples[2]), Ordering::Greater);
        assert_eq!(samples[3].cmp(&samples[4]), Ordering::Greater);
    }

    /// Every id with counts in 0..=2, compared against a first-difference walk.
    #[test]
    fn ordering_matches_counts_on_small_range() {
        const BASE: usize = 3;
        let ids: Vec<LightGroupId> = (0..BASE.pow(LIGHT_CATEGORY_COUNT as u32))
            .map(|mut code| {
                let mut counts = [0u16; LIGHT_CATEGORY_COUNT];
                for count in counts.iter_mut().rev() {
                    *count = (code % BASE) as u16;
                    code /= BASE;
                }
                LightGroupId::from_counts(counts)
            })
            .collect();

        for window in ids.windows(2) {
            assert!(window[0] < window[1], "{:?} !< {:?}", window[0], window[1]);
        }
        for a in &ids {
            for b in &ids {
                let expected = a
                    .counts()
                    .iter()
                    .zip(b.counts())
                    .map(|(x, y)| x.cmp(&y))
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal);
                assert_eq!(a.cmp(b), expected, "{a:?} vs {b:?}");
                assert_eq!(a == b, expected == Ordering::Equal);
            }
        }
    }

    #[test]
    fn start_indices_follow_category_order() {
        let mut group = LightGroup::new();
        for index in 0..3 {
            group.add_ambient_light(index);
        }
        for index in 3..5 {
            group.add_directional_light(index);
        }
        for index in 5..9 {
            group.add_point_light(index);
        }
        assert_eq!(group.ambient_light_start_index(), 0);
        assert_eq!(group.directional_light_start_index(), 3);
        assert_eq!(group.point_light_start_index(), 5);
        assert_eq!(group.spot_light_start_index(), 9);
        assert_eq!(group.shadow_spot_light_start_index(), 9);
        assert_eq!(group.len() as u32, group.id().total());
    }

    #[test]
    fn out_of_order_appends_keep_runs_contiguous() {
        let mut group = LightGroup::new();
        group.add_shadow_spot_light(40);
        group.add_point_light(20);
        group.add_ambient_light(1);
        group.add_point_light(21);
        group.add_directional_light(10);

        assert_eq!(group.indices(), &[1, 10, 20, 21, 40]);
        assert_eq!(group.point_lights(), &[20, 21]);
        assert_eq!(group.shadow_spot_lights(), &[40]);
        assert_eq!(group.point_light_start_index(), 2);
    }

    #[test]
    fn remove_light_updates_layout() {
        let mut group = LightGroup::new();
        group.add_point_light(3);
        group.add_point_light(4);
        group.add_spot_light(7);
        assert!(group.remove_light(LightCategory::Point, 3));
        assert!(!group.remove_light(LightCategory::Point, 3));
        assert_eq!(group.indices(), &[4, 7]);
        assert_eq!(group.spot_light_start_index(), 1);
    }

    #[test]
    fn shadow_category_mapping_round_trips() {
        for category in LightCategory::ALL {
            if let Some(shadow) = category.with_shadow() {
                assert!(shadow.is_shadow());
                assert_eq!(shadow.without_shadow(), category.without_shadow());
            }
        }
        assert_eq!(LightCategory::Ambient.with_shadow(), None);
    }
}
