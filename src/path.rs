// 数据集中的位置
// 三种路径互相嵌套：根、元素 `(0008,1140)`、序列里的item `(0008,1140).#0`。
// 路径是不可变的值，克隆只是增加一个引用计数。

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::model::Tag;

// 一个数据集的位置：根，或者某个序列中的某个item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataSetPath {
    Root,
    Item(ItemPath),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementPath(Arc<ElementNode>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct ElementNode {
    parent: DataSetPath,
    tag: Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemPath(Arc<ItemNode>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct ItemNode {
    sequence: ElementPath,
    index: u32,
}

// 任意一种路径
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DicomPath {
    Root,
    Element(ElementPath),
    Item(ItemPath),
}

impl DataSetPath {
    pub fn tag(&self, tag: Tag) -> ElementPath {
        ElementPath(Arc::new(ElementNode {
            parent: self.clone(),
            tag,
        }))
    }

    pub fn is_root(&self) -> bool {
        matches!(self, DataSetPath::Root)
    }

    // 根是0，每进入一层item加1
    pub fn depth(&self) -> usize {
        match self {
            DataSetPath::Root => 0,
            DataSetPath::Item(item) => item.sequence().parent().depth() + 1,
        }
    }
}

impl ElementPath {
    pub fn parent(&self) -> &DataSetPath {
        &self.0.parent
    }

    pub fn tag(&self) -> Tag {
        self.0.tag
    }

    pub fn sequence_item(&self, index: u32) -> ItemPath {
        ItemPath(Arc::new(ItemNode {
            sequence: self.clone(),
            index,
        }))
    }
}

impl ItemPath {
    pub fn sequence(&self) -> &ElementPath {
        &self.0.sequence
    }

    pub fn index(&self) -> u32 {
        self.0.index
    }

    // 同一个序列里的下一个item
    pub fn next(&self) -> ItemPath {
        self.sequence().sequence_item(self.index() + 1)
    }

    pub fn tag(&self, tag: Tag) -> ElementPath {
        DataSetPath::Item(self.clone()).tag(tag)
    }
}

impl fmt::Display for DataSetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSetPath::Root => Ok(()),
            DataSetPath::Item(item) => item.fmt(f),
        }
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent() {
            DataSetPath::Root => write!(f, "{}", self.tag()),
            DataSetPath::Item(item) => write!(f, "{}.{}", item, self.tag()),
        }
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.#{}", self.sequence(), self.index())
    }
}

impl fmt::Display for DicomPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DicomPath::Root => Ok(()),
            DicomPath::Element(path) => path.fmt(f),
            DicomPath::Item(path) => path.fmt(f),
        }
    }
}

// 排序按字符串形式
macro_rules! order_by_string_form {
    ($($ty:ty),*) => {
        $(
            impl PartialOrd for $ty {
                fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                    Some(self.cmp(other))
                }
            }

            impl Ord for $ty {
                fn cmp(&self, other: &Self) -> Ordering {
                    self.to_string().cmp(&other.to_string())
                }
            }
        )*
    };
}

order_by_string_form!(DataSetPath, ElementPath, ItemPath, DicomPath);

impl From<DataSetPath> for DicomPath {
    fn from(path: DataSetPath) -> Self {
        match path {
            DataSetPath::Root => DicomPath::Root,
            DataSetPath::Item(item) => DicomPath::Item(item),
        }
    }
}

impl From<ElementPath> for DicomPath {
    fn from(path: ElementPath) -> Self {
        DicomPath::Element(path)
    }
}

impl From<ItemPath> for DicomPath {
    fn from(path: ItemPath) -> Self {
        DicomPath::Item(path)
    }
}

impl From<ItemPath> for DataSetPath {
    fn from(path: ItemPath) -> Self {
        DataSetPath::Item(path)
    }
}
