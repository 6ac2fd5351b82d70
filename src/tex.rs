//! Tex: a registry-owned image set (spec §3 "Dat / Tex", §4.12). Not
//! present in the teacher, which owns its font atlas image directly;
//! grounded on `original_source`'s `dvz_tex_image`/`dvz_tex_resize` and
//! this crate's own [`crate::image::ImageSet`].

use ash::vk;

use crate::error::Result;
use crate::image::{ImageSet, Shape};
use crate::resources::{ResourceId, Resources};

/// A single registry-owned image set exposed to callers (spec §4.12: "A Tex
/// is a single Image-set owned by the registry").
pub struct Tex {
    id: ResourceId,
}

impl Tex {
    pub fn image_set<'a>(&self, resources: &'a Resources) -> &'a ImageSet {
        resources.image(self.id)
    }

    pub fn image_set_mut<'a>(&self, resources: &'a mut Resources) -> &'a mut ImageSet {
        resources.image_mut(self.id)
    }
}

impl Resources {
    /// `dvz_tex_image`: creates a registry-owned image set of the given
    /// shape/format/tiling/usage (spec §4.5/§4.12).
    #[allow(clippy::too_many_arguments)]
    pub fn create_tex(
        &mut self,
        count: u32,
        shape: Shape,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        final_layout: vk::ImageLayout,
    ) -> Result<Tex> {
        let image = ImageSet::builder(count, shape, format)
            .tiling(tiling)
            .usage(usage)
            .aspect(aspect)
            .final_layout(final_layout)
            .create(self.gpu())?;
        let id = self.insert_image(image);
        Ok(Tex { id })
    }

    /// `dvz_tex_resize`: rebuilds the image set in place at the new shape,
    /// losing contents, the same way [`ImageSet::resize`] does for a single
    /// set (spec §4.12). A Tex never shares its backing store with another
    /// Tex, so this always recreates rather than sub-allocating.
    pub fn resize_tex(&mut self, tex: &Tex, shape: Shape) -> Result<()> {
        self.image_mut(tex.id).resize(shape)
    }

    /// Drops a Tex's image set, cascading through [`ImageSet`]'s own `Drop`.
    pub fn destroy_tex(&mut self, tex: Tex) {
        self.remove_image(tex.id);
    }
}
