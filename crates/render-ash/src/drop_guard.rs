use std::mem::ManuallyDrop;

use ash::vk;

use crate::{device::AshDevice, Result};

pub trait Destroy {
    type Context;
    unsafe fn destroy(self, context: &Self::Context);
}

pub trait CreateWithInfo: Destroy + Sized {
    type CreateInfo;
    unsafe fn create(context: &Self::Context, create_info: &Self::CreateInfo) -> Result<Self>;
}

impl AshDevice {
    /// Creates a native object that is destroyed again unless the guard is taken.
    #[inline]
    pub unsafe fn create<C>(&self, create_info: &C::CreateInfo) -> Result<Guard<'_, C>>
    where
        C: CreateWithInfo<Context = Self>,
    {
        Ok(Guard::new(self, unsafe { C::create(self, create_info)? }))
    }

    #[inline]
    pub unsafe fn destroy<D>(&self, handle: D)
    where
        D: Destroy<Context = Self>,
    {
        unsafe { handle.destroy(self) }
    }

    #[inline]
    pub(crate) fn hold<D>(&self, item: D) -> Guard<'_, D>
    where
        D: Destroy<Context = Self>,
    {
        Guard::new(self, item)
    }
}

/// Destroys the held object on drop unless it was taken out.
pub struct Guard<'a, D: Destroy> {
    item: ManuallyDrop<D>,
    context: &'a D::Context,
}

impl<'a, D: Destroy> Guard<'a, D> {
    #[inline]
    pub fn new(context: &'a D::Context, item: D) -> Self {
        Self {
            item: ManuallyDrop::new(item),
            context,
        }
    }

    #[inline]
    pub fn take(mut self) -> D {
        let item = unsafe { ManuallyDrop::take(&mut self.item) };
        std::mem::forget(self);
        item
    }

    #[inline]
    pub fn as_mut(&mut self) -> &mut D {
        &mut self.item
    }
}

impl<D: Destroy + Copy> Guard<'_, D> {
    #[inline]
    pub fn raw(&self) -> D {
        *self.item
    }
}

impl<D: Destroy> Drop for Guard<'_, D> {
    fn drop(&mut self) {
        unsafe {
            let item = ManuallyDrop::take(&mut self.item);
            item.destroy(self.context);
        }
    }
}

impl<D: Destroy> Destroy for Vec<D> {
    type Context = D::Context;
    #[inline]
    unsafe fn destroy(self, device: &D::Context) {
        self.into_iter()
            .for_each(|d| unsafe { d.destroy(device) })
    }
}

impl<D: Destroy> Destroy for Option<D> {
    type Context = D::Context;
    #[inline]
    unsafe fn destroy(self, device: &D::Context) {
        if let Some(d) = self {
            unsafe { d.destroy(device) }
        }
    }
}

macro_rules! impl_create_destroy {
    ($ctx:ty {
        $(
            $vktype:ty : ($destroy:ident $(, $create:ident $createinfo:ty)?)
        ),* $(,)?
    }) => {
        $(
            impl Destroy for $vktype {
                type Context = $ctx;
                #[inline]
                unsafe fn destroy(self, ctx: &Self::Context) {
                    if self != <$vktype as vk::Handle>::from_raw(0) {
                        unsafe { ctx.$destroy(self, None) };
                    }
                }
            }

            $(
                impl CreateWithInfo for $vktype {
                    type CreateInfo = $createinfo;
                    #[inline]
                    unsafe fn create(ctx: &Self::Context, create_info: &Self::CreateInfo) -> Result<Self> {
                        Ok(unsafe { ctx.$create(create_info, None)? })
                    }
                }
            )?
        )*
    };
}

impl_create_destroy! {
    AshDevice {
        vk::Fence : (destroy_fence, create_fence vk::FenceCreateInfo),
        vk::Semaphore : (destroy_semaphore, create_semaphore vk::SemaphoreCreateInfo),
        vk::CommandPool : (destroy_command_pool, create_command_pool vk::CommandPoolCreateInfo),
        vk::Buffer : (destroy_buffer, create_buffer vk::BufferCreateInfo),
        vk::BufferView : (destroy_buffer_view, create_buffer_view vk::BufferViewCreateInfo),
        vk::Image : (destroy_image, create_image vk::ImageCreateInfo),
        vk::ImageView : (destroy_image_view, create_image_view vk::ImageViewCreateInfo),
        vk::Sampler : (destroy_sampler, create_sampler vk::SamplerCreateInfo),
        vk::Framebuffer : (destroy_framebuffer, create_framebuffer vk::FramebufferCreateInfo),
        vk::RenderPass : (destroy_render_pass, create_render_pass vk::RenderPassCreateInfo),
        vk::ShaderModule : (destroy_shader_module, create_shader_module vk::ShaderModuleCreateInfo),
        vk::DescriptorSetLayout : (destroy_descriptor_set_layout, create_descriptor_set_layout vk::DescriptorSetLayoutCreateInfo),
        vk::DescriptorPool : (destroy_descriptor_pool, create_descriptor_pool vk::DescriptorPoolCreateInfo),
        vk::PipelineLayout : (destroy_pipeline_layout, create_pipeline_layout vk::PipelineLayoutCreateInfo),
        vk::PipelineCache : (destroy_pipeline_cache, create_pipeline_cache vk::PipelineCacheCreateInfo),
        vk::QueryPool : (destroy_query_pool, create_query_pool vk::QueryPoolCreateInfo),
        vk::Pipeline : (destroy_pipeline),
    }
}
