use std::sync::Arc;

use ash::vk;
use forge_render::commands::{PipelineStatistics, QueryPoolDesc, QueryType};

use crate::{convert::VkInto, device::AshDevice, Error, Result};

/// Statistics counted by pipeline-statistics pools, in result order.
const STATISTICS: vk::QueryPipelineStatisticFlags = vk::QueryPipelineStatisticFlags::from_raw(
    vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES.as_raw()
        | vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_PRIMITIVES.as_raw()
        | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::CLIPPING_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::CLIPPING_PRIMITIVES.as_raw()
        | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS.as_raw(),
);

const STATISTICS_COUNT: usize = 7;

/// Number of 64 bit values one query produces.
pub(crate) const fn values_per_query(query_type: QueryType) -> usize {
    match query_type {
        QueryType::Timestamp | QueryType::Occlusion => 1,
        QueryType::PipelineStatistics => STATISTICS_COUNT,
    }
}

fn statistics_from_values(values: &[u64; STATISTICS_COUNT]) -> PipelineStatistics {
    PipelineStatistics {
        input_assembly_vertices: values[0],
        input_assembly_primitives: values[1],
        vertex_shader_invocations: values[2],
        clipping_invocations: values[3],
        clipping_primitives: values[4],
        fragment_shader_invocations: values[5],
        compute_shader_invocations: values[6],
    }
}

pub struct QueryPool {
    device: Arc<AshDevice>,
    raw: vk::QueryPool,
    query_type: QueryType,
    count: u32,
    node_index: u32,
}

impl QueryPool {
    pub(crate) fn new(device: &Arc<AshDevice>, desc: &QueryPoolDesc) -> Result<Self> {
        if desc.query_count == 0 {
            return Err(Error::InvalidDesc("query pool without queries"));
        }
        let mut create_info = vk::QueryPoolCreateInfo::builder()
            .query_type(desc.query_type.vk_into())
            .query_count(desc.query_count);
        if desc.query_type == QueryType::PipelineStatistics {
            if !device.features().pipeline_statistics_query {
                return Err(Error::Unsupported("pipeline statistics queries"));
            }
            create_info = create_info.pipeline_statistics(STATISTICS);
        }
        let raw = unsafe { device.create::<vk::QueryPool>(&create_info)?.take() };
        Ok(Self {
            device: device.clone(),
            raw,
            query_type: desc.query_type,
            count: desc.query_count,
            node_index: desc.node_index,
        })
    }

    #[inline]
    pub(crate) fn raw(&self) -> vk::QueryPool {
        self.raw
    }

    #[inline]
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    /// Size in bytes of one resolved query.
    #[inline]
    pub fn stride(&self) -> u64 {
        (values_per_query(self.query_type) * std::mem::size_of::<u64>()) as u64
    }

    /// Nanoseconds per timestamp tick.
    #[inline]
    pub fn timestamp_period(&self) -> f32 {
        self.device.limits().timestamp_period
    }

    fn check_range(&self, first: u32, count: u32) -> Result<()> {
        if count == 0 || first.checked_add(count).is_none_or(|end| end > self.count) {
            return Err(Error::InvalidDesc("query range out of bounds"));
        }
        Ok(())
    }

    /// Results of `count` queries starting at `first`, waiting until they are available.
    ///
    /// Pipeline-statistics pools return all counters of a query in sequence.
    pub fn data(&self, first: u32, count: u32) -> Result<Vec<u64>> {
        self.check_range(first, count)?;
        let flags = vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT;
        if self.query_type == QueryType::PipelineStatistics {
            let mut results = vec![[0u64; STATISTICS_COUNT]; count as usize];
            unsafe {
                self.device
                    .get_query_pool_results(self.raw, first, count, &mut results, flags)?
            };
            Ok(results.into_iter().flatten().collect())
        } else {
            let mut results = vec![0u64; count as usize];
            unsafe {
                self.device
                    .get_query_pool_results(self.raw, first, count, &mut results, flags)?
            };
            Ok(results)
        }
    }

    pub fn pipeline_statistics(&self, index: u32) -> Result<PipelineStatistics> {
        if self.query_type != QueryType::PipelineStatistics {
            return Err(Error::InvalidDesc("not a pipeline statistics pool"));
        }
        self.check_range(index, 1)?;
        let mut results = [[0u64; STATISTICS_COUNT]; 1];
        unsafe {
            self.device.get_query_pool_results(
                self.raw,
                index,
                1,
                &mut results,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )?
        };
        Ok(statistics_from_values(&results[0]))
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy(self.raw) }
    }
}

impl std::fmt::Debug for QueryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPool")
            .field("query_type", &self.query_type)
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_per_query() {
        assert_eq!(1, values_per_query(QueryType::Timestamp));
        assert_eq!(1, values_per_query(QueryType::Occlusion));
        assert_eq!(
            STATISTICS.as_raw().count_ones() as usize,
            values_per_query(QueryType::PipelineStatistics)
        );
    }

    #[test]
    fn test_statistics_follow_bit_order() {
        let stats = statistics_from_values(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(1, stats.input_assembly_vertices);
        assert_eq!(3, stats.vertex_shader_invocations);
        assert_eq!(6, stats.fragment_shader_invocations);
        assert_eq!(7, stats.compute_shader_invocations);
    }
}
